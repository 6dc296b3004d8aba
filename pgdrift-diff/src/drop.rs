//! Drop resolution.
//!
//! Everything present in the target but not in the source is dropped. Views
//! are removed dependents first; tables lose every foreign key that touches
//! them before they are dropped themselves.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::batch::{BatchItem, Direction, order_batch};
use crate::config::DiffConfig;
use crate::connection::Connection;
use crate::dump::DumpRepresentation;
use crate::error::DiffResult;
use crate::key::{ObjectKind, TableKey, qualified_name, quote_identifier, schema_identifier};
use crate::reference::Candidate;
use crate::snapshot::{RoutineDescriptor, Snapshot, difference};
use crate::statements::Statements;

/// Resolves the drop side of a diff.
pub struct DropResolver<'a> {
    config: &'a DiffConfig,
    source: &'a Snapshot,
    target: &'a Snapshot,
}

impl<'a> DropResolver<'a> {
    /// Create a resolver over two snapshots.
    pub fn new(config: &'a DiffConfig, source: &'a Snapshot, target: &'a Snapshot) -> Self {
        Self {
            config,
            source,
            target,
        }
    }

    /// Drop routines missing from the source, in target order.
    pub fn drop_routines(&self, out: &mut Statements) {
        for (key, routine) in difference(&self.target.routines, &self.source.routines) {
            debug!(routine = %key, "Dropping routine");
            out.drop_routines.push(drop_routine(routine));
        }
    }

    /// Target views missing from the source.
    pub fn missing_views(&self) -> Vec<&'a TableKey> {
        difference(&self.target.views, &self.source.views)
            .map(|(key, _)| key)
            .collect()
    }

    /// Drop views, dependents first.
    ///
    /// `candidates` holds the target DDL of every view to drop: the missing
    /// ones and the ones whose definition changed.
    pub fn drop_views(
        &self,
        candidates: IndexMap<TableKey, Vec<String>>,
        out: &mut Statements,
    ) -> DiffResult<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let references: Vec<_> = candidates.keys().map(Candidate::relation).collect();
        let batch = candidates
            .into_iter()
            .map(|(key, lines)| {
                let kind = self.target.views.get(&key).map_or(ObjectKind::View, |v| v.kind);
                (key, BatchItem::new(kind, lines))
            })
            .collect();

        let ordered = order_batch(
            "views",
            batch,
            &references,
            &self.config.dump,
            Direction::DependentsFirst,
            self.config.strict_cycles,
        )?;

        for (key, rep) in &ordered.items {
            debug!(view = %key, "Dropping view");
            out.drop_views.push(drop_view(key, rep));
        }
        Ok(ordered.warnings)
    }

    /// Drop tables missing from the source, after every foreign key touching them.
    pub async fn drop_tables(
        &self,
        target: &dyn Connection,
        out: &mut Statements,
    ) -> DiffResult<()> {
        let tables: Vec<TableKey> = difference(&self.target.tables, &self.source.tables)
            .map(|(key, _)| key.clone())
            .collect();
        if tables.is_empty() {
            return Ok(());
        }

        let foreign_keys: IndexSet<_> = target.foreign_keys(&tables).await?.into_iter().collect();
        for fk in &foreign_keys {
            out.drop_foreign_keys.push(format!(
                "ALTER TABLE IF EXISTS {} DROP CONSTRAINT IF EXISTS {};",
                qualified_name(&fk.schema, &fk.table),
                quote_identifier(&fk.name)
            ));
        }
        for key in &tables {
            debug!(table = %key, "Dropping table");
            out.drop_tables
                .push(format!("DROP TABLE IF EXISTS {};", key.qualified()));
        }
        Ok(())
    }

    /// Drop schemas missing from the source.
    pub fn drop_schemas(&self, out: &mut Statements) {
        for schema in &self.target.schemas {
            if !self.source.schemas.contains(schema) {
                debug!(schema = %schema, "Dropping schema");
                out.drop_schemas.push(format!(
                    "DROP SCHEMA IF EXISTS {} CASCADE;",
                    schema_identifier(schema)
                ));
            }
        }
    }
}

/// `DROP FUNCTION schema."name"(types);` or the procedure equivalent.
pub fn drop_routine(routine: &RoutineDescriptor) -> String {
    format!("DROP {} {};", routine.kind.to_sql(), routine.qualified_call())
}

fn drop_view(key: &TableKey, rep: &DumpRepresentation) -> String {
    let materialized = rep
        .create
        .first()
        .is_some_and(|create| create.to_ascii_uppercase().starts_with("CREATE MATERIALIZED"));
    let kind = if materialized { "MATERIALIZED VIEW" } else { "VIEW" };
    format!("DROP {} {};", kind, key.qualified())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::memory::MemoryConnection;
    use crate::snapshot::{ForeignKeyRef, TableDescriptor};

    fn snapshot() -> Snapshot {
        Snapshot::default()
    }

    #[test]
    fn test_drop_routine_statement() {
        let calc = RoutineDescriptor::function("public", "calc").param("x", "int");
        assert_eq!(drop_routine(&calc), "DROP FUNCTION public.\"calc\"(int);");

        let archive = RoutineDescriptor::procedure("ops", "archive")
            .param("ids", "int")
            .array_param("tags", "text");
        assert_eq!(drop_routine(&archive), "DROP PROCEDURE ops.\"archive\"(int, text[]);");
    }

    #[test]
    fn test_drop_routines_is_set_difference() {
        let keep = RoutineDescriptor::function("public", "keep");
        let calc = RoutineDescriptor::function("public", "calc").param("x", "int");

        let mut source = snapshot();
        source.routines.insert(keep.key(), keep.clone());
        let mut target = snapshot();
        target.routines.insert(keep.key(), keep);
        target.routines.insert(calc.key(), calc);

        let config = DiffConfig::default();
        let mut out = Statements::new();
        DropResolver::new(&config, &source, &target).drop_routines(&mut out);
        assert_eq!(out.drop_routines, vec!["DROP FUNCTION public.\"calc\"(int);"]);
    }

    #[test]
    fn test_drop_views_dependents_first() {
        let config = DiffConfig::default();
        let source = snapshot();
        let target = snapshot();

        let mut candidates = IndexMap::new();
        candidates.insert(
            TableKey::new("public", "base"),
            vec!["CREATE VIEW public.base AS".to_string(), " SELECT 1 AS id;".to_string()],
        );
        candidates.insert(
            TableKey::new("public", "top"),
            vec![
                "CREATE VIEW public.top AS".to_string(),
                " SELECT id".to_string(),
                "   FROM public.base;".to_string(),
            ],
        );

        let mut out = Statements::new();
        let warnings = DropResolver::new(&config, &source, &target)
            .drop_views(candidates, &mut out)
            .unwrap();

        assert!(warnings.is_empty());
        assert_eq!(
            out.drop_views,
            vec!["DROP VIEW public.\"top\";", "DROP VIEW public.\"base\";"]
        );
    }

    #[tokio::test]
    async fn test_drop_tables_drops_foreign_keys_first() {
        let config = DiffConfig::default();
        let mut source = snapshot();
        source.tables.insert(
            TableKey::new("public", "orders"),
            TableDescriptor::table("public", "orders"),
        );
        let mut target = source.clone();
        target.tables.insert(
            TableKey::new("public", "customers"),
            TableDescriptor::table("public", "customers"),
        );

        let fk = ForeignKeyRef {
            schema: "public".to_string(),
            table: "orders".to_string(),
            name: "orders_customer_fkey".to_string(),
        };
        let conn = MemoryConnection::new("target")
            .with_foreign_key(fk, TableKey::new("public", "customers"));

        let mut out = Statements::new();
        DropResolver::new(&config, &source, &target)
            .drop_tables(&conn, &mut out)
            .await
            .unwrap();

        assert_eq!(
            out.drop_foreign_keys,
            vec![
                "ALTER TABLE IF EXISTS public.\"orders\" DROP CONSTRAINT IF EXISTS \"orders_customer_fkey\";"
            ]
        );
        assert_eq!(out.drop_tables, vec!["DROP TABLE IF EXISTS public.\"customers\";"]);
    }

    #[test]
    fn test_drop_schemas() {
        let config = DiffConfig::default();
        let mut source = snapshot();
        source.schemas = vec!["public".to_string()];
        let mut target = snapshot();
        target.schemas = vec!["public".to_string(), "Legacy".to_string()];

        let mut out = Statements::new();
        DropResolver::new(&config, &source, &target).drop_schemas(&mut out);
        assert_eq!(out.drop_schemas, vec!["DROP SCHEMA IF EXISTS \"Legacy\" CASCADE;"]);
    }
}
