//! Schema snapshots.
//!
//! A [`Snapshot`] holds every table, view and routine read from one database,
//! keyed for constant-time lookup and set comparison against the other side.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DiffConfig;
use crate::connection::Connection;
use crate::error::DiffResult;
use crate::key::{ObjectKind, RoutineKey, TableKey, qualified_name};

/// A table or view as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Schema name.
    pub schema: String,
    /// Relation name.
    pub name: String,
    /// [`ObjectKind::Table`] or [`ObjectKind::View`].
    pub kind: ObjectKind,
    /// Whether this is a partitioned table.
    pub is_partitioned: bool,
}

impl TableDescriptor {
    /// Create a table descriptor.
    pub fn table(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            kind: ObjectKind::Table,
            is_partitioned: false,
        }
    }

    /// Create a view descriptor.
    pub fn view(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::View,
            ..Self::table(schema, name)
        }
    }

    /// Mark the table as partitioned.
    pub fn partitioned(mut self) -> Self {
        self.is_partitioned = true;
        self
    }

    /// Key of this relation.
    pub fn key(&self) -> TableKey {
        TableKey::new(&self.schema, &self.name)
    }
}

/// A routine parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineParameter {
    /// 1-based position.
    pub ordinal: i32,
    /// Parameter name, empty when unnamed.
    pub name: String,
    /// Formatted type name, e.g. `integer` or `text`.
    pub type_name: String,
    /// Raw catalog data type, e.g. `ARRAY` or `USER-DEFINED`.
    pub data_type: String,
    /// Whether the parameter is an array of `type_name`.
    pub is_array: bool,
}

impl RoutineParameter {
    /// Type as written in an argument list.
    pub fn argument_type(&self) -> String {
        if self.is_array {
            format!("{}[]", self.type_name)
        } else {
            self.type_name.clone()
        }
    }

    /// Name and type as rendered in a signature.
    pub fn signature_fragment(&self) -> String {
        if self.name.is_empty() {
            self.argument_type()
        } else {
            format!("{} {}", self.name, self.argument_type())
        }
    }
}

/// A function or procedure as listed by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutineDescriptor {
    /// Schema name.
    pub schema: String,
    /// Catalog-unique name distinguishing overloads.
    pub specific_name: String,
    /// Routine name.
    pub name: String,
    /// [`ObjectKind::Function`] or [`ObjectKind::Procedure`].
    pub kind: ObjectKind,
    /// Implementation language (`sql`, `plpgsql`, ...).
    pub language: String,
    /// Return type, absent for procedures.
    pub return_type: Option<String>,
    /// Parameters in declaration order.
    pub parameters: Vec<RoutineParameter>,
}

impl RoutineDescriptor {
    /// Create a function descriptor.
    pub fn function(schema: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            schema: schema.into(),
            specific_name: name.clone(),
            name,
            kind: ObjectKind::Function,
            language: "sql".to_string(),
            return_type: None,
            parameters: Vec::new(),
        }
    }

    /// Create a procedure descriptor.
    pub fn procedure(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::Procedure,
            ..Self::function(schema, name)
        }
    }

    /// Add a parameter.
    pub fn param(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.push_param(name.into(), type_name.into(), false)
    }

    /// Add an array parameter.
    pub fn array_param(self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.push_param(name.into(), type_name.into(), true)
    }

    fn push_param(mut self, name: String, type_name: String, is_array: bool) -> Self {
        let data_type = if is_array {
            "ARRAY".to_string()
        } else {
            type_name.clone()
        };
        self.parameters.push(RoutineParameter {
            ordinal: self.parameters.len() as i32 + 1,
            name,
            type_name,
            data_type,
            is_array,
        });
        self
    }

    /// Set the return type.
    pub fn returns(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = Some(return_type.into());
        self
    }

    /// Set the language.
    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Set the catalog-specific name.
    pub fn specific_name(mut self, specific_name: impl Into<String>) -> Self {
        self.specific_name = specific_name.into();
        self
    }

    /// Rendered parameter signature.
    pub fn signature(&self) -> String {
        self.parameters
            .iter()
            .map(RoutineParameter::signature_fragment)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Argument types as accepted by `DROP FUNCTION`.
    pub fn argument_types(&self) -> String {
        self.parameters
            .iter()
            .map(RoutineParameter::argument_type)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Number of declared parameters.
    pub fn arity(&self) -> usize {
        self.parameters.len()
    }

    /// Key of this routine.
    pub fn key(&self) -> RoutineKey {
        RoutineKey::new(&self.schema, &self.name, self.signature())
    }

    /// `schema."name"(types)`.
    pub fn qualified_call(&self) -> String {
        format!(
            "{}({})",
            qualified_name(&self.schema, &self.name),
            self.argument_types()
        )
    }
}

/// A foreign-key constraint, identified by the table that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Schema of the owning table.
    pub schema: String,
    /// Owning table.
    pub table: String,
    /// Constraint name.
    pub name: String,
}

/// Everything read from one database for one diff run.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Schemas passing the filter.
    pub schemas: Vec<String>,
    /// Tables by key.
    pub tables: IndexMap<TableKey, TableDescriptor>,
    /// Views by key.
    pub views: IndexMap<TableKey, TableDescriptor>,
    /// Routines by full signature key.
    pub routines: IndexMap<RoutineKey, RoutineDescriptor>,
}

impl Snapshot {
    /// Total number of tables, views and routines.
    pub fn object_count(&self) -> usize {
        self.tables.len() + self.views.len() + self.routines.len()
    }

    /// Check if the snapshot holds no objects and no schemas.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty() && self.object_count() == 0
    }
}

/// Entries of `left` whose key is absent from `right`, in `left`'s order.
pub fn difference<'a, K, V>(
    left: &'a IndexMap<K, V>,
    right: &'a IndexMap<K, V>,
) -> impl Iterator<Item = (&'a K, &'a V)> + 'a
where
    K: std::hash::Hash + Eq,
{
    left.iter().filter(move |(key, _)| !right.contains_key(*key))
}

/// Entries of `left` whose key is also present in `right`, in `left`'s order.
pub fn intersection<'a, K, V>(
    left: &'a IndexMap<K, V>,
    right: &'a IndexMap<K, V>,
) -> impl Iterator<Item = (&'a K, &'a V, &'a V)> + 'a
where
    K: std::hash::Hash + Eq,
{
    left.iter()
        .filter_map(move |(key, value)| right.get(key).map(|other| (key, value, other)))
}

/// Reads a [`Snapshot`] from a connection.
pub struct SnapshotBuilder<'a> {
    config: &'a DiffConfig,
}

impl<'a> SnapshotBuilder<'a> {
    /// Create a new builder.
    pub fn new(config: &'a DiffConfig) -> Self {
        Self { config }
    }

    /// Query the connection and build the snapshot.
    pub async fn build(&self, conn: &dyn Connection) -> DiffResult<Snapshot> {
        let matcher = self.config.schemas.matcher()?;
        let mut snapshot = Snapshot {
            schemas: conn.schemas(&matcher).await?,
            ..Default::default()
        };

        for relation in conn.relations(&matcher).await? {
            let key = relation.key();
            match relation.kind {
                ObjectKind::View => {
                    snapshot.views.insert(key, relation);
                }
                _ => {
                    snapshot.tables.insert(key, relation);
                }
            }
        }

        // Routines arrive grouped by name; overloads are split apart by signature.
        for (name, group) in conn.routines(&matcher).await? {
            debug!(routine = %name, overloads = group.len(), "Keying routine group");
            for routine in group {
                snapshot.routines.insert(routine.key(), routine);
            }
        }

        info!(
            connection = conn.name(),
            schemas = snapshot.schemas.len(),
            tables = snapshot.tables.len(),
            views = snapshot.views.len(),
            routines = snapshot.routines.len(),
            "Snapshot built"
        );

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnection;

    #[test]
    fn test_signature_and_arguments() {
        let routine = RoutineDescriptor::function("public", "calc")
            .param("a", "integer")
            .array_param("tags", "text")
            .returns("integer");

        assert_eq!(routine.signature(), "a integer, tags text[]");
        assert_eq!(routine.argument_types(), "integer, text[]");
        assert_eq!(routine.arity(), 2);
        assert_eq!(routine.parameters[1].ordinal, 2);
        assert_eq!(routine.parameters[1].data_type, "ARRAY");
        assert_eq!(routine.qualified_call(), "public.\"calc\"(integer, text[])");
    }

    #[test]
    fn test_unnamed_parameter_signature() {
        let routine = RoutineDescriptor::function("public", "f").param("", "int");
        assert_eq!(routine.signature(), "int");
    }

    #[test]
    fn test_difference_and_intersection() {
        let mut left = IndexMap::new();
        left.insert("a", 1);
        left.insert("b", 2);
        let mut right = IndexMap::new();
        right.insert("b", 3);
        right.insert("c", 4);

        let only_left: Vec<_> = difference(&left, &right).map(|(k, _)| *k).collect();
        assert_eq!(only_left, vec!["a"]);

        let both: Vec<_> = intersection(&left, &right)
            .map(|(k, l, r)| (*k, *l, *r))
            .collect();
        assert_eq!(both, vec![("b", 2, 3)]);
    }

    #[tokio::test]
    async fn test_build_splits_relations_and_overloads() {
        let conn = MemoryConnection::new("source")
            .with_table(TableDescriptor::table("public", "orders"), "")
            .with_table(TableDescriptor::view("public", "order_totals"), "")
            .with_routine(RoutineDescriptor::function("public", "f").param("a", "int"), "")
            .with_routine(
                RoutineDescriptor::function("public", "f")
                    .param("a", "int")
                    .param("b", "int"),
                "",
            );

        let config = DiffConfig::default();
        let snapshot = SnapshotBuilder::new(&config).build(&conn).await.unwrap();

        assert_eq!(snapshot.schemas, vec!["public".to_string()]);
        assert!(snapshot.tables.contains_key(&TableKey::new("public", "orders")));
        assert!(snapshot.views.contains_key(&TableKey::new("public", "order_totals")));
        assert_eq!(snapshot.routines.len(), 2);
        assert_eq!(snapshot.object_count(), 4);
    }

    #[tokio::test]
    async fn test_build_respects_schema_filter() {
        let conn = MemoryConnection::new("source")
            .with_table(TableDescriptor::table("public", "orders"), "")
            .with_table(TableDescriptor::table("audit", "events"), "");

        let config = DiffConfig::default().exclude_schema("audit");
        let snapshot = SnapshotBuilder::new(&config).build(&conn).await.unwrap();

        assert_eq!(snapshot.tables.len(), 1);
        assert_eq!(snapshot.schemas, vec!["public".to_string()]);
    }

    #[tokio::test]
    async fn test_build_propagates_connectivity_errors() {
        let conn = MemoryConnection::new("target").failing();
        let config = DiffConfig::default();
        let err = SnapshotBuilder::new(&config).build(&conn).await.unwrap_err();
        assert!(err.is_connectivity());
    }
}
