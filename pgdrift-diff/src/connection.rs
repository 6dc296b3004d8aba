//! Database collaborator traits.
//!
//! The engine never talks to a database directly. Catalog listings and raw DDL
//! text come through [`Connection`]; the finished script goes out through
//! [`ScriptExecutor`].

use indexmap::IndexMap;

use crate::config::SchemaMatcher;
use crate::error::DiffResult;
use crate::key::TableKey;
use crate::snapshot::{ForeignKeyRef, RoutineDescriptor, TableDescriptor};

/// The object whose DDL text is requested.
#[derive(Debug, Clone, Copy)]
pub enum DdlTarget<'a> {
    /// A table or view.
    Relation(&'a TableDescriptor),
    /// A function or procedure.
    Routine(&'a RoutineDescriptor),
}

impl DdlTarget<'_> {
    /// Human-readable name for logs and errors.
    pub fn display_name(&self) -> String {
        match self {
            Self::Relation(table) => table.key().to_string(),
            Self::Routine(routine) => routine.key().to_string(),
        }
    }
}

/// Read-only access to one database's catalog.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// Name used in logs, e.g. `source` or a database name.
    fn name(&self) -> &str;

    /// List schemas accepted by the matcher.
    async fn schemas(&self, matcher: &SchemaMatcher) -> DiffResult<Vec<String>>;

    /// List tables and views in accepted schemas.
    async fn relations(&self, matcher: &SchemaMatcher) -> DiffResult<Vec<TableDescriptor>>;

    /// List routines in accepted schemas, grouped by routine name.
    async fn routines(
        &self,
        matcher: &SchemaMatcher,
    ) -> DiffResult<IndexMap<String, Vec<RoutineDescriptor>>>;

    /// List foreign keys owned by, or pointing at, any of the given tables.
    async fn foreign_keys(&self, tables: &[TableKey]) -> DiffResult<Vec<ForeignKeyRef>>;

    /// Raw DDL text of one object, as ordered lines.
    async fn ddl(&self, target: DdlTarget<'_>) -> DiffResult<Vec<String>>;
}

/// Runs a finished migration script.
#[async_trait::async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute the whole script. Failures surface as [`DiffError::Execution`].
    ///
    /// [`DiffError::Execution`]: crate::error::DiffError::Execution
    async fn execute_script(&self, script: &str) -> DiffResult<()>;
}
