//! Object identities used as map keys during a diff.
//!
//! Keys are plain values: equality and hashing are structural so that the
//! snapshots of two different databases can be intersected and subtracted.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of a schema object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A regular or partitioned table.
    Table,
    /// A view or materialized view.
    View,
    /// A function.
    Function,
    /// A stored procedure.
    Procedure,
}

impl ObjectKind {
    /// SQL keyword for this kind.
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Function => "FUNCTION",
            Self::Procedure => "PROCEDURE",
        }
    }

    /// Check if this is a function or procedure.
    pub fn is_routine(&self) -> bool {
        matches!(self, Self::Function | Self::Procedure)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Table => "table",
            Self::View => "view",
            Self::Function => "function",
            Self::Procedure => "procedure",
        })
    }
}

/// Identity of a table or view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableKey {
    /// Schema name.
    pub schema: String,
    /// Relation name.
    pub name: String,
}

impl TableKey {
    /// Create a new key.
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Schema-qualified name as used in generated statements, e.g. `public."orders"`.
    pub fn qualified(&self) -> String {
        qualified_name(&self.schema, &self.name)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Identity of a function or procedure.
///
/// Overloaded routines share a schema and a name, so the rendered parameter
/// signature is part of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoutineKey {
    /// Schema name.
    pub schema: String,
    /// Routine name.
    pub name: String,
    /// Ordered parameter rendering (name, type and array qualifier).
    pub signature: String,
}

impl RoutineKey {
    /// Create a new key.
    pub fn new(
        schema: impl Into<String>,
        name: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            signature: signature.into(),
        }
    }
}

impl fmt::Display for RoutineKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.schema, self.name, self.signature)
    }
}

/// Quote a PostgreSQL identifier.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Render a schema name, quoting it only when it would not survive unquoted.
pub fn schema_identifier(schema: &str) -> String {
    let plain = schema
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && schema
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if plain {
        schema.to_string()
    } else {
        quote_identifier(schema)
    }
}

/// Render `schema."name"`.
pub fn qualified_name(schema: &str, name: &str) -> String {
    format!("{}.{}", schema_identifier(schema), quote_identifier(name))
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
