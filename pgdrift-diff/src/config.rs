//! Diff configuration.
//!
//! Every knob the engine reads lives on [`DiffConfig`], which is passed by
//! reference into the snapshot builder and the dump representation builder.
//! A configuration can be built in code or loaded from a TOML file:
//!
//! ```toml
//! replace_routines = true
//! strict_cycles = false
//!
//! [schemas]
//! include = "^(public|billing)$"
//! exclude = ["audit"]
//!
//! [dump]
//! include_owner = false
//! include_privileges = true
//! include_comments = true
//! ```

use std::path::Path;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DiffError, DiffResult};

/// Schemas that are never compared unless an explicit include pattern says so.
pub const INTERNAL_SCHEMAS: &[&str] = &["pg_catalog", "information_schema"];

/// Top-level configuration for a diff run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Which schemas take part in the comparison.
    pub schemas: SchemaFilter,
    /// How DDL text is turned into dump representations.
    pub dump: DumpOptions,
    /// Re-emit routines whose definition changed with `CREATE OR REPLACE`.
    pub replace_routines: bool,
    /// Fail instead of breaking dependency cycles arbitrarily.
    pub strict_cycles: bool,
    /// Label of the transactional block, derived from the title when absent.
    pub block_label: Option<String>,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            schemas: SchemaFilter::default(),
            dump: DumpOptions::default(),
            replace_routines: true,
            strict_cycles: false,
            block_label: None,
        }
    }
}

impl DiffConfig {
    /// Create a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> DiffResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> DiffResult<Self> {
        let config: DiffConfig = toml::from_str(content)?;
        // Surface a bad pattern at load time rather than mid-diff.
        config.schemas.matcher()?;
        Ok(config)
    }

    /// Restrict the comparison to schemas matching a regular expression.
    pub fn include_schemas(mut self, pattern: impl Into<String>) -> Self {
        self.schemas.include = Some(pattern.into());
        self
    }

    /// Exclude a schema by name.
    pub fn exclude_schema(mut self, schema: impl Into<String>) -> Self {
        self.schemas.exclude.push(schema.into());
        self
    }

    /// Set the dump options.
    pub fn dump_options(mut self, dump: DumpOptions) -> Self {
        self.dump = dump;
        self
    }

    /// Enable or disable `CREATE OR REPLACE` for changed routines.
    pub fn replace_routines(mut self, replace: bool) -> Self {
        self.replace_routines = replace;
        self
    }

    /// Enable or disable strict cycle handling.
    pub fn strict_cycles(mut self, strict: bool) -> Self {
        self.strict_cycles = strict;
        self
    }

    /// Set an explicit block label.
    pub fn block_label(mut self, label: impl Into<String>) -> Self {
        self.block_label = Some(label.into());
        self
    }
}

/// Schema inclusion rules.
///
/// When `include` is absent, PostgreSQL-internal namespaces (`pg_catalog`,
/// `information_schema`, `pg_toast*`, `pg_temp_*`) are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaFilter {
    /// Regular expression a schema name must match.
    pub include: Option<String>,
    /// Schema names that are always skipped.
    pub exclude: Vec<String>,
}

impl SchemaFilter {
    /// Create a filter with only an include pattern.
    pub fn including(pattern: impl Into<String>) -> Self {
        Self {
            include: Some(pattern.into()),
            exclude: Vec::new(),
        }
    }

    /// Compile the filter.
    pub fn matcher(&self) -> DiffResult<SchemaMatcher> {
        let include = match &self.include {
            Some(pattern) => Some(Regex::new(pattern).map_err(|e| {
                DiffError::config(format!("invalid schema pattern '{}': {}", pattern, e))
            })?),
            None => None,
        };
        Ok(SchemaMatcher {
            include,
            exclude: self.exclude.clone(),
        })
    }
}

/// A compiled [`SchemaFilter`].
#[derive(Debug, Clone, Default)]
pub struct SchemaMatcher {
    include: Option<Regex>,
    exclude: Vec<String>,
}

impl SchemaMatcher {
    /// Check whether a schema takes part in the comparison.
    pub fn matches(&self, schema: &str) -> bool {
        if self.exclude.iter().any(|s| s == schema) {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(schema),
            None => !is_internal_schema(schema),
        }
    }
}

/// Check if a schema is one of PostgreSQL's own namespaces.
pub fn is_internal_schema(schema: &str) -> bool {
    INTERNAL_SCHEMAS.contains(&schema)
        || schema.starts_with("pg_toast")
        || schema.starts_with("pg_temp_")
}

/// Options controlling which dumped statements are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DumpOptions {
    /// Keep `ALTER ... OWNER TO` statements.
    pub include_owner: bool,
    /// Keep `GRANT` / `REVOKE` statements.
    pub include_privileges: bool,
    /// Keep `COMMENT ON` statements.
    pub include_comments: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            include_owner: false,
            include_privileges: true,
            include_comments: true,
        }
    }
}
