//! Statement accumulation and script assembly.
//!
//! Resolvers append generated SQL to named parts of a [`Statements`] buffer.
//! The assembler concatenates the parts into ten fixed sections, each wrapped
//! in region comments and left out entirely when empty, inside one labelled
//! anonymous block.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::debug;

/// The fixed sections of a migration script, in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Section {
    /// Routines present only in the target.
    DropRoutines,
    /// Views present only in the target, or changed.
    DropViews,
    /// Constraint, column and secondary changes to common tables.
    AlterTables,
    /// Tables and schemas present only in the target.
    DropTables,
    /// Schemas and tables present only in the source.
    CreateTables,
    /// Non-unique indexes.
    AlterIndexes,
    /// Table privileges.
    TableGrants,
    /// Table comments.
    TableComments,
    /// Views present only in the source, or changed.
    CreateViews,
    /// Routines present only in the source, or changed.
    CreateRoutines,
}

impl Section {
    /// All sections in output order.
    pub const ALL: [Section; 10] = [
        Section::DropRoutines,
        Section::DropViews,
        Section::AlterTables,
        Section::DropTables,
        Section::CreateTables,
        Section::AlterIndexes,
        Section::TableGrants,
        Section::TableComments,
        Section::CreateViews,
        Section::CreateRoutines,
    ];

    /// Region title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::DropRoutines => "Drop non-existing routines",
            Self::DropViews => "Drop non-existing views",
            Self::AlterTables => "Alter tables",
            Self::DropTables => "Drop non-existing tables",
            Self::CreateTables => "Create tables",
            Self::AlterIndexes => "Alter indexes",
            Self::TableGrants => "Table grants",
            Self::TableComments => "Table comments",
            Self::CreateViews => "Create non-existing or changed views",
            Self::CreateRoutines => "Create non-existing routines",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Accumulated statements of one diff run.
///
/// Fields are grouped by the section they land in; within a section they are
/// emitted in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Statements {
    /// `DROP FUNCTION` / `DROP PROCEDURE`.
    pub drop_routines: Vec<String>,
    /// `DROP VIEW`, dependents first.
    pub drop_views: Vec<String>,

    /// Constraint and index drops on common tables.
    pub drop_constraints: Vec<String>,
    /// Primary key and unique additions on common tables.
    pub add_unique_constraints: Vec<String>,
    /// Other constraint additions on common tables.
    pub add_constraints: Vec<String>,
    /// Column alterations on common tables.
    pub alter_columns: Vec<String>,
    /// Other source-only statements of common tables (defaults, triggers).
    pub alter_other: Vec<String>,

    /// Foreign keys touching dropped tables.
    pub drop_foreign_keys: Vec<String>,
    /// `DROP TABLE`.
    pub drop_tables: Vec<String>,
    /// `DROP SCHEMA ... CASCADE`.
    pub drop_schemas: Vec<String>,

    /// `CREATE SCHEMA`.
    pub create_schemas: Vec<String>,
    /// Bare `CREATE TABLE` statements.
    pub create_tables: Vec<String>,
    /// Primary key and unique fragments of new tables.
    pub unique: Vec<String>,
    /// Remaining append fragments of new tables.
    pub create: Vec<String>,

    /// Non-unique index creations and drops.
    pub alter_indexes: Vec<String>,
    /// `GRANT` / `REVOKE`.
    pub table_grants: Vec<String>,
    /// `COMMENT ON`.
    pub table_comments: Vec<String>,
    /// `CREATE VIEW`.
    pub create_views: Vec<String>,
    /// `CREATE FUNCTION` / `CREATE PROCEDURE`.
    pub create_routines: Vec<String>,
}

impl Statements {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements of one section, in output order.
    pub fn section(&self, section: Section) -> Vec<&String> {
        let parts: Vec<&Vec<String>> = match section {
            Section::DropRoutines => vec![&self.drop_routines],
            Section::DropViews => vec![&self.drop_views],
            Section::AlterTables => vec![
                &self.drop_constraints,
                &self.add_unique_constraints,
                &self.add_constraints,
                &self.alter_columns,
                &self.alter_other,
            ],
            Section::DropTables => {
                vec![&self.drop_foreign_keys, &self.drop_tables, &self.drop_schemas]
            }
            Section::CreateTables => vec![
                &self.create_schemas,
                &self.create_tables,
                &self.unique,
                &self.create,
            ],
            Section::AlterIndexes => vec![&self.alter_indexes],
            Section::TableGrants => vec![&self.table_grants],
            Section::TableComments => vec![&self.table_comments],
            Section::CreateViews => vec![&self.create_views],
            Section::CreateRoutines => vec![&self.create_routines],
        };
        parts.into_iter().flatten().collect()
    }

    /// Check if no statement was generated.
    pub fn is_empty(&self) -> bool {
        Section::ALL
            .iter()
            .all(|section| self.section(*section).is_empty())
    }

    /// Total number of statements.
    pub fn len(&self) -> usize {
        Section::ALL
            .iter()
            .map(|section| self.section(*section).len())
            .sum()
    }

    /// Append every part of `other` to the matching part of `self`.
    pub fn merge(&mut self, other: Statements) {
        let Statements {
            drop_routines,
            drop_views,
            drop_constraints,
            add_unique_constraints,
            add_constraints,
            alter_columns,
            alter_other,
            drop_foreign_keys,
            drop_tables,
            drop_schemas,
            create_schemas,
            create_tables,
            unique,
            create,
            alter_indexes,
            table_grants,
            table_comments,
            create_views,
            create_routines,
        } = other;
        self.drop_routines.extend(drop_routines);
        self.drop_views.extend(drop_views);
        self.drop_constraints.extend(drop_constraints);
        self.add_unique_constraints.extend(add_unique_constraints);
        self.add_constraints.extend(add_constraints);
        self.alter_columns.extend(alter_columns);
        self.alter_other.extend(alter_other);
        self.drop_foreign_keys.extend(drop_foreign_keys);
        self.drop_tables.extend(drop_tables);
        self.drop_schemas.extend(drop_schemas);
        self.create_schemas.extend(create_schemas);
        self.create_tables.extend(create_tables);
        self.unique.extend(unique);
        self.create.extend(create);
        self.alter_indexes.extend(alter_indexes);
        self.table_grants.extend(table_grants);
        self.table_comments.extend(table_comments);
        self.create_views.extend(create_views);
        self.create_routines.extend(create_routines);
    }
}

/// An assembled migration script.
#[derive(Debug, Clone)]
pub struct MigrationScript {
    /// Title passed to the diff.
    pub title: String,
    /// Label of the anonymous block.
    pub label: String,
    /// The SQL text.
    pub text: String,
    /// SHA-256 of the text, hex encoded.
    pub checksum: String,
    /// When the script was assembled. Not part of the text.
    pub generated_at: DateTime<Utc>,
    /// Statement count of every non-empty section.
    pub sections: IndexMap<Section, usize>,
    /// Dependency cycles broken while ordering.
    pub warnings: Vec<String>,
}

impl MigrationScript {
    /// Total number of statements.
    pub fn statement_count(&self) -> usize {
        self.sections.values().sum()
    }

    /// Check whether a section is present.
    pub fn has_section(&self, section: Section) -> bool {
        self.sections.contains_key(&section)
    }

    /// The script with its rollback line enabled, for a trial run that
    /// leaves the database untouched.
    ///
    /// Only the block's own rollback line is touched; the same text inside a
    /// routine body stays as it is.
    pub fn dry_run_text(&self) -> String {
        let tail = format!("\n{}\nEND {};\n", ROLLBACK_COMMENTED, self.label);
        let mut text = self.text.clone();
        if let Some(at) = text.rfind(&tail) {
            text.replace_range(
                at..at + tail.len(),
                &format!("\n{}\nEND {};\n", ROLLBACK, self.label),
            );
        }
        text
    }

    /// Verify the checksum matches the text.
    pub fn verify_checksum(&self) -> bool {
        compute_checksum(&self.text) == self.checksum
    }

    /// One-line description of the script.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .sections
            .iter()
            .map(|(section, count)| format!("{}: {}", section.title(), count))
            .collect();
        if !self.warnings.is_empty() {
            parts.push(format!("{} warnings", self.warnings.len()));
        }
        format!(
            "{} ({} statements; {})",
            self.title,
            self.statement_count(),
            parts.join(", ")
        )
    }
}

impl fmt::Display for MigrationScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

const ROLLBACK: &str = "ROLLBACK;";
const ROLLBACK_COMMENTED: &str = "-- ROLLBACK;";

/// Assembles a [`Statements`] buffer into a script.
#[derive(Debug, Clone)]
pub struct ScriptAssembler {
    title: String,
    label: String,
    warnings: Vec<String>,
}

impl ScriptAssembler {
    /// Create an assembler. The block label is derived from the title.
    pub fn new(title: impl Into<String>) -> Self {
        let title = title.into();
        let label = block_label(&title);
        Self {
            title,
            label,
            warnings: Vec::new(),
        }
    }

    /// Use an explicit block label.
    pub fn label(mut self, label: impl AsRef<str>) -> Self {
        self.label = block_label(label.as_ref());
        self
    }

    /// Attach ordering warnings.
    pub fn warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Build the script, or `None` when there is nothing to do.
    pub fn assemble(self, statements: &Statements) -> Option<MigrationScript> {
        if statements.is_empty() {
            return None;
        }

        let mut body = String::new();
        let mut sections = IndexMap::new();
        for section in Section::ALL {
            let parts = statements.section(section);
            if parts.is_empty() {
                continue;
            }
            debug!(section = section.title(), statements = parts.len(), "Assembling section");
            body.push_str(&format!("-- region {}\n", section.title()));
            for statement in &parts {
                body.push_str(statement);
                body.push('\n');
            }
            body.push_str(&format!("-- endregion {}\n\n", section.title()));
            sections.insert(section, parts.len());
        }

        let tag = block_tag(&body);
        let text = format!(
            "-- pgdrift migration: {title}\nDO {tag}\n<<{label}>>\nBEGIN\n\n{body}{rollback}\nEND {label};\n{tag};\n",
            title = header_title(&self.title),
            tag = tag,
            label = self.label,
            body = body,
            rollback = ROLLBACK_COMMENTED,
        );

        Some(MigrationScript {
            checksum: compute_checksum(&text),
            title: self.title,
            label: self.label,
            text,
            generated_at: Utc::now(),
            sections,
            warnings: self.warnings,
        })
    }
}

/// The title folded onto the single header comment line.
fn header_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c == '\r' || c == '\n' { ' ' } else { c })
        .collect()
}

/// A dollar-quote tag that does not occur in `body`.
fn block_tag(body: &str) -> String {
    let mut tag = "$pgdrift$".to_string();
    let mut n = 0;
    while body.contains(&tag) {
        n += 1;
        tag = format!("$pgdrift_{}$", n);
    }
    tag
}

/// Turn arbitrary text into a plpgsql block label.
pub fn block_label(text: &str) -> String {
    let mut label = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            label.push(c.to_ascii_lowercase());
        } else if !label.ends_with('_') {
            label.push('_');
        }
    }
    let label = label.trim_matches('_');
    let label = match label.chars().next() {
        None => "pgdrift_migration".to_string(),
        Some(c) if c.is_ascii_digit() => format!("m_{}", label),
        Some(_) => label.to_string(),
    };
    label.chars().take(63).collect()
}

/// Compute a SHA256 checksum of the content.
fn compute_checksum(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
