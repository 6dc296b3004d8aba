//! Catalog queries.
//!
//! Every query reads `pg_catalog` directly and casts its columns to plain
//! `text`/`int4` so rows decode without custom types. Objects that belong to
//! an extension are left out: they are created by `CREATE EXTENSION`, not by
//! a migration.

use indexmap::IndexMap;
use pgdrift_diff::{ObjectKind, RoutineDescriptor, RoutineParameter, TableDescriptor};

use crate::error::{PgError, PgResult};

/// All schemas, filtered client-side.
pub const SCHEMAS: &str = "\
SELECT n.nspname::text
FROM pg_catalog.pg_namespace n
WHERE NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_depend d
    WHERE d.classid = 'pg_catalog.pg_namespace'::regclass AND d.objid = n.oid AND d.deptype = 'e'
)
ORDER BY n.nspname";

/// Tables, partitioned tables, views and materialized views.
pub const RELATIONS: &str = "\
SELECT n.nspname::text, c.relname::text, c.relkind::text
FROM pg_catalog.pg_class c
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p', 'v', 'm')
  AND NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_depend d
    WHERE d.classid = 'pg_catalog.pg_class'::regclass AND d.objid = c.oid AND d.deptype = 'e'
  )
ORDER BY n.nspname, c.relname";

/// Functions and procedures with one row per input parameter.
///
/// Output parameters are skipped. Routines without input parameters yield a
/// single row with a null ordinal.
pub const ROUTINES: &str = "\
SELECT n.nspname::text,
       p.proname::text || '_' || p.oid::text,
       p.proname::text,
       p.prokind::text,
       l.lanname::text,
       CASE WHEN p.prokind = 'p' THEN NULL ELSE pg_catalog.pg_get_function_result(p.oid) END,
       a.ordinal::int4,
       COALESCE(p.proargnames[a.ordinal], '')::text,
       CASE WHEN t.typcategory = 'A' THEN 'ARRAY'
            WHEN t.typtype IN ('c', 'd', 'e') THEN 'USER-DEFINED'
            ELSE pg_catalog.format_type(t.oid, NULL) END,
       pg_catalog.format_type(CASE WHEN t.typcategory = 'A' THEN t.typelem ELSE t.oid END, NULL),
       COALESCE(t.typcategory = 'A', false)
FROM pg_catalog.pg_proc p
JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
JOIN pg_catalog.pg_language l ON l.oid = p.prolang
LEFT JOIN LATERAL (
    SELECT u.type_oid, u.ordinal
    FROM unnest(COALESCE(p.proallargtypes, p.proargtypes::oid[]))
        WITH ORDINALITY AS u(type_oid, ordinal)
    WHERE COALESCE(p.proargmodes[u.ordinal], 'i') IN ('i', 'b', 'v')
) a ON true
LEFT JOIN pg_catalog.pg_type t ON t.oid = a.type_oid
WHERE p.prokind IN ('f', 'p')
  AND NOT EXISTS (
    SELECT 1 FROM pg_catalog.pg_depend d
    WHERE d.classid = 'pg_catalog.pg_proc'::regclass AND d.objid = p.oid AND d.deptype = 'e'
  )
ORDER BY n.nspname, p.proname, p.oid, a.ordinal";

/// Foreign keys owned by or pointing at any of the given tables.
///
/// `$1` holds schema names and `$2` table names, pairwise.
pub const FOREIGN_KEYS: &str = "\
SELECT DISTINCT n.nspname::text, c.relname::text, con.conname::text
FROM pg_catalog.pg_constraint con
JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace
WHERE con.contype = 'f'
  AND EXISTS (
    SELECT 1 FROM unnest($1::text[], $2::text[]) AS dropped(schema_name, table_name)
    WHERE (dropped.schema_name = n.nspname AND dropped.table_name = c.relname)
       OR (dropped.schema_name = rn.nspname AND dropped.table_name = rc.relname)
  )
ORDER BY 1, 2, 3";

/// Definition and comment of one routine, looked up by specific name.
pub const ROUTINE_DEFINITION: &str = "\
SELECT pg_catalog.pg_get_functiondef(p.oid),
       pg_catalog.pg_get_function_identity_arguments(p.oid),
       pg_catalog.obj_description(p.oid, 'pg_proc')
FROM pg_catalog.pg_proc p
JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace
WHERE n.nspname = $1 AND p.proname::text || '_' || p.oid::text = $2";

/// Map a `relkind` to a descriptor.
pub fn relation(schema: String, name: String, relkind: &str) -> PgResult<TableDescriptor> {
    match relkind {
        "r" => Ok(TableDescriptor::table(schema, name)),
        "p" => Ok(TableDescriptor::table(schema, name).partitioned()),
        "v" | "m" => Ok(TableDescriptor::view(schema, name)),
        other => Err(PgError::query(format!(
            "unexpected relkind '{}' for {}.{}",
            other, schema, name
        ))),
    }
}

/// One row of [`ROUTINES`].
#[derive(Debug, Clone)]
pub struct RoutineRow {
    /// Schema name.
    pub schema: String,
    /// `proname_oid`, unique per overload.
    pub specific_name: String,
    /// Routine name.
    pub name: String,
    /// `f` or `p`.
    pub prokind: String,
    /// Language name.
    pub language: String,
    /// Result type of a function.
    pub return_type: Option<String>,
    /// Parameter position, absent for a routine without parameters.
    pub ordinal: Option<i32>,
    /// Parameter name, empty when unnamed.
    pub parameter_name: String,
    /// Raw data type (`ARRAY`, `USER-DEFINED` or the formatted type).
    pub data_type: Option<String>,
    /// Formatted type, the element type for arrays.
    pub type_name: Option<String>,
    /// Whether the parameter is an array.
    pub is_array: bool,
}

/// Fold routine rows into descriptors grouped by routine name.
///
/// Rows must arrive ordered by routine and then by parameter ordinal.
pub fn group_routines(
    rows: impl IntoIterator<Item = RoutineRow>,
) -> PgResult<IndexMap<String, Vec<RoutineDescriptor>>> {
    let mut by_specific: IndexMap<String, RoutineDescriptor> = IndexMap::new();

    for row in rows {
        let kind = match row.prokind.as_str() {
            "f" => ObjectKind::Function,
            "p" => ObjectKind::Procedure,
            other => {
                return Err(PgError::query(format!(
                    "unexpected prokind '{}' for {}.{}",
                    other, row.schema, row.name
                )));
            }
        };
        let routine = by_specific
            .entry(row.specific_name.clone())
            .or_insert_with(|| RoutineDescriptor {
                schema: row.schema.clone(),
                specific_name: row.specific_name.clone(),
                name: row.name.clone(),
                kind,
                language: row.language.clone(),
                return_type: row.return_type.clone(),
                parameters: Vec::new(),
            });

        if let (Some(ordinal), Some(type_name)) = (row.ordinal, row.type_name) {
            routine.parameters.push(RoutineParameter {
                ordinal,
                name: row.parameter_name,
                data_type: row.data_type.unwrap_or_else(|| type_name.clone()),
                type_name,
                is_array: row.is_array,
            });
        }
    }

    let mut grouped: IndexMap<String, Vec<RoutineDescriptor>> = IndexMap::new();
    for routine in by_specific.into_values() {
        grouped.entry(routine.name.clone()).or_default().push(routine);
    }
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn row(specific: &str, name: &str, ordinal: Option<i32>, param: &str, ty: &str) -> RoutineRow {
        RoutineRow {
            schema: "public".to_string(),
            specific_name: specific.to_string(),
            name: name.to_string(),
            prokind: "f".to_string(),
            language: "sql".to_string(),
            return_type: Some("integer".to_string()),
            ordinal,
            parameter_name: param.to_string(),
            data_type: ordinal.map(|_| ty.to_string()),
            type_name: ordinal.map(|_| ty.to_string()),
            is_array: false,
        }
    }

    #[test]
    fn test_relation_kinds() {
        let table = relation("public".into(), "orders".into(), "r").unwrap();
        assert_eq!(table.kind, ObjectKind::Table);
        assert!(!table.is_partitioned);

        let partitioned = relation("public".into(), "events".into(), "p").unwrap();
        assert!(partitioned.is_partitioned);

        let view = relation("public".into(), "totals".into(), "m").unwrap();
        assert_eq!(view.kind, ObjectKind::View);

        assert!(relation("public".into(), "seq".into(), "S").is_err());
    }

    #[test]
    fn test_group_overloads() {
        let rows = vec![
            row("f_100", "f", Some(1), "a", "integer"),
            row("f_200", "f", Some(1), "a", "integer"),
            row("f_200", "f", Some(2), "b", "integer"),
            row("now_utc_300", "now_utc", None, "", ""),
        ];

        let grouped = group_routines(rows).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["f"].len(), 2);
        assert_eq!(grouped["f"][0].signature(), "a integer");
        assert_eq!(grouped["f"][1].signature(), "a integer, b integer");
        assert!(grouped["now_utc"][0].parameters.is_empty());
    }

    #[test]
    fn test_group_array_parameter() {
        let mut tags = row("tag_1", "tag", Some(1), "tags", "ARRAY");
        tags.type_name = Some("text".to_string());
        tags.is_array = true;

        let grouped = group_routines(vec![tags]).unwrap();
        let routine = &grouped["tag"][0];
        assert_eq!(routine.qualified_call(), "public.\"tag\"(text[])");
        assert_eq!(routine.parameters[0].data_type, "ARRAY");
    }

    #[test]
    fn test_unknown_prokind() {
        let mut aggregate = row("sum_1", "sum", None, "", "");
        aggregate.prokind = "a".to_string();
        assert!(group_routines(vec![aggregate]).is_err());
    }
}
