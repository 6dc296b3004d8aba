//! In-memory database collaborator.
//!
//! [`MemoryConnection`] serves a fixed catalog and fixed DDL text. It lets a
//! diff run against hand-written or previously captured `pg_dump` output
//! without a server, and records every script handed to it for execution.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use tracing::debug;

use crate::config::SchemaMatcher;
use crate::connection::{Connection, DdlTarget, ScriptExecutor};
use crate::error::{DiffError, DiffResult};
use crate::key::TableKey;
use crate::snapshot::{ForeignKeyRef, RoutineDescriptor, TableDescriptor};

/// A catalog held in memory.
#[derive(Debug, Default)]
pub struct MemoryConnection {
    name: String,
    schemas: IndexSet<String>,
    relations: Vec<TableDescriptor>,
    routines: Vec<RoutineDescriptor>,
    ddl: HashMap<String, Vec<String>>,
    foreign_keys: Vec<(ForeignKeyRef, TableKey)>,
    unreachable: bool,
    reject_scripts: bool,
    executed: Mutex<Vec<String>>,
}

impl MemoryConnection {
    /// Create an empty catalog.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add an empty schema.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schemas.insert(schema.into());
        self
    }

    /// Add a table or view with its DDL text.
    pub fn with_table(mut self, table: TableDescriptor, ddl: &str) -> Self {
        self.schemas.insert(table.schema.clone());
        self.ddl
            .insert(DdlTarget::Relation(&table).display_name(), split_lines(ddl));
        self.relations.push(table);
        self
    }

    /// Add a routine with its DDL text.
    pub fn with_routine(mut self, routine: RoutineDescriptor, ddl: &str) -> Self {
        self.schemas.insert(routine.schema.clone());
        self.ddl
            .insert(DdlTarget::Routine(&routine).display_name(), split_lines(ddl));
        self.routines.push(routine);
        self
    }

    /// Add a foreign key owned by `fk.table` and pointing at `references`.
    pub fn with_foreign_key(mut self, fk: ForeignKeyRef, references: TableKey) -> Self {
        self.foreign_keys.push((fk, references));
        self
    }

    /// Make every catalog request fail with a connectivity error.
    pub fn failing(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Make script execution fail.
    pub fn rejecting_scripts(mut self) -> Self {
        self.reject_scripts = true;
        self
    }

    /// Scripts executed so far.
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }

    fn check_reachable(&self) -> DiffResult<()> {
        if self.unreachable {
            return Err(DiffError::connectivity(format!(
                "{}: connection refused",
                self.name
            )));
        }
        Ok(())
    }
}

fn split_lines(ddl: &str) -> Vec<String> {
    ddl.lines().map(str::to_string).collect()
}

#[async_trait::async_trait]
impl Connection for MemoryConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn schemas(&self, matcher: &SchemaMatcher) -> DiffResult<Vec<String>> {
        self.check_reachable()?;
        Ok(self
            .schemas
            .iter()
            .filter(|schema| matcher.matches(schema))
            .cloned()
            .collect())
    }

    async fn relations(&self, matcher: &SchemaMatcher) -> DiffResult<Vec<TableDescriptor>> {
        self.check_reachable()?;
        Ok(self
            .relations
            .iter()
            .filter(|relation| matcher.matches(&relation.schema))
            .cloned()
            .collect())
    }

    async fn routines(
        &self,
        matcher: &SchemaMatcher,
    ) -> DiffResult<IndexMap<String, Vec<RoutineDescriptor>>> {
        self.check_reachable()?;
        let mut grouped: IndexMap<String, Vec<RoutineDescriptor>> = IndexMap::new();
        for routine in self
            .routines
            .iter()
            .filter(|routine| matcher.matches(&routine.schema))
        {
            grouped
                .entry(routine.name.clone())
                .or_default()
                .push(routine.clone());
        }
        Ok(grouped)
    }

    async fn foreign_keys(&self, tables: &[TableKey]) -> DiffResult<Vec<ForeignKeyRef>> {
        self.check_reachable()?;
        Ok(self
            .foreign_keys
            .iter()
            .filter(|(fk, references)| {
                let owner = TableKey::new(&fk.schema, &fk.table);
                tables.contains(&owner) || tables.contains(references)
            })
            .map(|(fk, _)| fk.clone())
            .collect())
    }

    async fn ddl(&self, target: DdlTarget<'_>) -> DiffResult<Vec<String>> {
        self.check_reachable()?;
        let name = target.display_name();
        debug!(connection = %self.name, object = %name, "Serving DDL");
        self.ddl
            .get(&name)
            .cloned()
            .ok_or_else(|| DiffError::connectivity(format!("{}: no DDL for {}", self.name, name)))
    }
}

#[async_trait::async_trait]
impl ScriptExecutor for MemoryConnection {
    async fn execute_script(&self, script: &str) -> DiffResult<()> {
        if self.reject_scripts {
            return Err(DiffError::execution(format!(
                "{}: script rejected",
                self.name
            )));
        }
        self.executed.lock().push(script.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchemaFilter;

    #[tokio::test]
    async fn test_routines_grouped_by_name() {
        let conn = MemoryConnection::new("db")
            .with_routine(RoutineDescriptor::function("public", "f").param("a", "int"), "")
            .with_routine(RoutineDescriptor::function("public", "g"), "")
            .with_routine(
                RoutineDescriptor::function("public", "f")
                    .param("a", "int")
                    .param("b", "int"),
                "",
            );

        let grouped = conn.routines(&SchemaMatcher::default()).await.unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["f"].len(), 2);
    }

    #[tokio::test]
    async fn test_ddl_lookup() {
        let table = TableDescriptor::table("public", "orders");
        let conn = MemoryConnection::new("db")
            .with_table(table.clone(), "CREATE TABLE public.orders (\n    id integer\n);");

        let lines = conn.ddl(DdlTarget::Relation(&table)).await.unwrap();
        assert_eq!(lines.len(), 3);

        let missing = TableDescriptor::table("public", "missing");
        let err = conn.ddl(DdlTarget::Relation(&missing)).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[tokio::test]
    async fn test_schema_filter_applies() {
        let conn = MemoryConnection::new("db")
            .with_schema("public")
            .with_schema("pg_catalog")
            .with_schema("audit");
        let matcher = SchemaFilter::including("^(public|audit)$").matcher().unwrap();
        assert_eq!(conn.schemas(&matcher).await.unwrap(), vec!["public", "audit"]);
    }

    #[tokio::test]
    async fn test_foreign_keys_in_both_directions() {
        let fk = ForeignKeyRef {
            schema: "public".to_string(),
            table: "orders".to_string(),
            name: "orders_customer_fkey".to_string(),
        };
        let conn = MemoryConnection::new("db")
            .with_foreign_key(fk.clone(), TableKey::new("public", "customers"));

        let owned = conn.foreign_keys(&[TableKey::new("public", "orders")]).await.unwrap();
        let referenced = conn.foreign_keys(&[TableKey::new("public", "customers")]).await.unwrap();
        let unrelated = conn.foreign_keys(&[TableKey::new("public", "items")]).await.unwrap();

        assert_eq!(owned, vec![fk.clone()]);
        assert_eq!(referenced, vec![fk]);
        assert!(unrelated.is_empty());
    }

    #[tokio::test]
    async fn test_executor_records_and_rejects() {
        let conn = MemoryConnection::new("db");
        conn.execute_script("SELECT 1;").await.unwrap();
        assert_eq!(conn.executed(), vec!["SELECT 1;".to_string()]);

        let conn = MemoryConnection::new("db").rejecting_scripts();
        let err = conn.execute_script("SELECT 1;").await.unwrap_err();
        assert!(err.is_execution());
        assert!(conn.executed().is_empty());
    }
}
