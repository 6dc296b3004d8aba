//! Structural diff of tables present on both sides.

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::dump::{AppendKind, DumpRepresentation, comment_target, constraint_rank, index_name};
use crate::key::{TableKey, schema_identifier};
use crate::lexer::{find_keyword, leading_words, strip_comments};
use crate::statements::Statements;

/// Compares the two representations of a common table.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableDiffer;

impl TableDiffer {
    /// Create a differ.
    pub fn new() -> Self {
        Self
    }

    /// Append the statements that turn `target` into `source`.
    ///
    /// Returns `false`, without touching `out`, when both are equal.
    pub fn diff(
        &self,
        key: &TableKey,
        source: &DumpRepresentation,
        target: &DumpRepresentation,
        out: &mut Statements,
    ) -> bool {
        if source == target {
            return false;
        }
        let table = key.qualified();
        debug!(table = %key, "Table changed");

        let constraints = source.constraint_delta(target);
        for name in constraints.drop.keys() {
            out.drop_constraints.push(format!(
                "ALTER TABLE {} DROP CONSTRAINT IF EXISTS {};",
                table, name
            ));
        }
        for (name, definition) in constraints.ordered_adds() {
            let statement = format!("ALTER TABLE {} ADD CONSTRAINT {} {};", table, name, definition);
            if constraint_rank(definition) <= 1 {
                out.add_unique_constraints.push(statement);
            } else {
                out.add_constraints.push(statement);
            }
        }

        for clause in source.field_delta(target).clauses.values() {
            out.alter_columns
                .push(format!("ALTER TABLE {} {};", table, clause));
        }

        self.diff_indexes(key, source, target, out);
        diff_grants(source, target, out);
        diff_comments(source, target, out);

        for statement in only_in(other_statements(source), other_statements(target)) {
            out.alter_other.push(statement.clone());
        }

        true
    }

    fn diff_indexes(
        &self,
        key: &TableKey,
        source: &DumpRepresentation,
        target: &DumpRepresentation,
        out: &mut Statements,
    ) {
        let indexes = |rep: &DumpRepresentation| -> IndexMap<String, String> {
            rep.indexes()
                .filter_map(|statement| index_name(statement).map(|name| (name, statement.clone())))
                .collect()
        };
        let source_indexes = indexes(source);
        let target_indexes = indexes(target);

        for (name, statement) in &target_indexes {
            if source_indexes.get(name) != Some(statement) {
                out.drop_constraints.push(format!(
                    "DROP INDEX IF EXISTS {}.{};",
                    schema_identifier(&key.schema),
                    name
                ));
            }
        }
        for (name, statement) in &source_indexes {
            if target_indexes.get(name) != Some(statement) {
                if AppendKind::of(statement) == AppendKind::Unique {
                    out.add_unique_constraints.push(statement.clone());
                } else {
                    out.alter_indexes.push(statement.clone());
                }
            }
        }
    }
}

fn diff_grants(source: &DumpRepresentation, target: &DumpRepresentation, out: &mut Statements) {
    let source_grants: IndexSet<&String> = source.append_of(AppendKind::Grant).collect();
    let target_grants: IndexSet<&String> = target.append_of(AppendKind::Grant).collect();

    for grant in target_grants.difference(&source_grants) {
        if let Some(revoke) = revoke_for(grant) {
            out.table_grants.push(revoke);
        }
    }
    for grant in source_grants.difference(&target_grants) {
        out.table_grants.push((*grant).clone());
    }
}

fn diff_comments(source: &DumpRepresentation, target: &DumpRepresentation, out: &mut Statements) {
    let source_comments: IndexSet<&String> = source.append_of(AppendKind::Comment).collect();
    let target_comments: IndexSet<&String> = target.append_of(AppendKind::Comment).collect();
    let commented: IndexSet<&str> = source_comments
        .iter()
        .filter_map(|comment| comment_target(comment))
        .collect();

    for comment in target_comments.difference(&source_comments) {
        if let Some(object) = comment_target(comment) {
            if !commented.contains(object) {
                out.table_comments
                    .push(format!("COMMENT ON {} IS NULL;", object));
            }
        }
    }
    for comment in source_comments.difference(&target_comments) {
        out.table_comments.push((*comment).clone());
    }
}

/// Append statements not covered by the constraint, index, grant or comment deltas.
fn other_statements(rep: &DumpRepresentation) -> IndexSet<&String> {
    rep.append
        .iter()
        .filter(|statement| {
            matches!(AppendKind::of(statement), AppendKind::Other | AppendKind::Unique)
                && index_name(statement).is_none()
                && find_keyword(statement, "ADD CONSTRAINT", 0).is_none()
        })
        .collect()
}

fn only_in<'a>(left: IndexSet<&'a String>, right: IndexSet<&'a String>) -> Vec<&'a String> {
    left.into_iter()
        .filter(|statement| !right.contains(statement))
        .collect()
}

/// Turn a `GRANT` into the `REVOKE` that undoes it.
pub fn revoke_for(grant: &str) -> Option<String> {
    if leading_words(grant, 1).first().map(String::as_str) != Some("GRANT") {
        return None;
    }
    let grant = strip_comments(grant);
    let grant = grant.as_str();
    let to = find_keyword(grant, "TO", 0)?;
    let privileges = grant["GRANT".len()..to].trim();
    let mut grantees = grant[to + "TO".len()..].trim().trim_end_matches(';').trim_end();
    if let Some(option) = find_keyword(grantees, "WITH GRANT OPTION", 0) {
        grantees = grantees[..option].trim_end();
    }
    Some(format!("REVOKE {} FROM {};", privileges, grantees))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::DumpOptions;
    use crate::key::ObjectKind;

    fn rep(ddl: &str) -> DumpRepresentation {
        let lines: Vec<String> = ddl.lines().map(str::to_string).collect();
        DumpRepresentation::parse(ObjectKind::Table, "public.orders", &lines, &DumpOptions::default())
            .unwrap()
    }

    const TARGET: &str = "\
CREATE TABLE public.orders (
    id integer NOT NULL,
    status text,
    legacy text,
    CONSTRAINT orders_status_check CHECK ((status <> ''::text))
);
CREATE INDEX orders_status_idx ON public.orders USING btree (status);
GRANT ALL ON TABLE public.orders TO admin;
COMMENT ON COLUMN public.orders.legacy IS 'Old field';
";

    const SOURCE: &str = "\
CREATE TABLE public.orders (
    id bigint NOT NULL,
    status text DEFAULT 'new'::text NOT NULL,
    customer_id integer
);
ALTER TABLE ONLY public.orders
    ADD CONSTRAINT orders_pkey PRIMARY KEY (id);
ALTER TABLE ONLY public.orders
    ADD CONSTRAINT orders_customer_fkey FOREIGN KEY (customer_id) REFERENCES public.customers(id);
CREATE UNIQUE INDEX orders_customer_idx ON public.orders USING btree (customer_id);
GRANT SELECT ON TABLE public.orders TO reporting;
COMMENT ON TABLE public.orders IS 'Orders';
";

    #[test]
    fn test_equal_tables_emit_nothing() {
        let mut out = Statements::new();
        let changed = TableDiffer::new().diff(
            &TableKey::new("public", "orders"),
            &rep(SOURCE),
            &rep(SOURCE),
            &mut out,
        );
        assert!(!changed);
        assert!(out.is_empty());
    }

    #[test]
    fn test_changed_table() {
        let mut out = Statements::new();
        let changed = TableDiffer::new().diff(
            &TableKey::new("public", "orders"),
            &rep(SOURCE),
            &rep(TARGET),
            &mut out,
        );
        assert!(changed);

        assert_eq!(
            out.drop_constraints,
            vec![
                "ALTER TABLE public.\"orders\" DROP CONSTRAINT IF EXISTS orders_status_check;",
                "DROP INDEX IF EXISTS public.orders_status_idx;",
            ]
        );
        assert_eq!(
            out.add_unique_constraints,
            vec![
                "ALTER TABLE public.\"orders\" ADD CONSTRAINT orders_pkey PRIMARY KEY (id);",
                "CREATE UNIQUE INDEX orders_customer_idx ON public.orders USING btree (customer_id);",
            ]
        );
        assert_eq!(
            out.add_constraints,
            vec![
                "ALTER TABLE public.\"orders\" ADD CONSTRAINT orders_customer_fkey FOREIGN KEY (customer_id) REFERENCES public.customers(id);"
            ]
        );
        assert_eq!(
            out.alter_columns,
            vec![
                "ALTER TABLE public.\"orders\" ALTER COLUMN id TYPE bigint;",
                "ALTER TABLE public.\"orders\" ALTER COLUMN status SET DEFAULT 'new'::text, ALTER COLUMN status SET NOT NULL;",
                "ALTER TABLE public.\"orders\" ADD COLUMN customer_id integer;",
                "ALTER TABLE public.\"orders\" DROP COLUMN legacy;",
            ]
        );
        assert_eq!(
            out.table_grants,
            vec![
                "REVOKE ALL ON TABLE public.orders FROM admin;",
                "GRANT SELECT ON TABLE public.orders TO reporting;",
            ]
        );
        assert_eq!(
            out.table_comments,
            vec![
                "COMMENT ON COLUMN public.orders.legacy IS NULL;",
                "COMMENT ON TABLE public.orders IS 'Orders';",
            ]
        );
        assert!(out.alter_indexes.is_empty());
        assert!(out.alter_other.is_empty());
    }

    #[test]
    fn test_source_only_defaults_and_triggers() {
        let target = "CREATE TABLE public.orders (\n    id integer NOT NULL\n);";
        let source = "CREATE TABLE public.orders (\n    id integer NOT NULL\n);\n\
                      CREATE TRIGGER orders_touch BEFORE UPDATE ON public.orders FOR EACH ROW EXECUTE FUNCTION public.touch();";
        let mut out = Statements::new();
        TableDiffer::new().diff(
            &TableKey::new("public", "orders"),
            &rep(source),
            &rep(target),
            &mut out,
        );
        assert_eq!(out.alter_other.len(), 1);
        assert!(out.alter_other[0].starts_with("CREATE TRIGGER orders_touch"));
    }

    #[test]
    fn test_revoke_for() {
        assert_eq!(
            revoke_for("GRANT SELECT,INSERT ON TABLE public.orders TO app WITH GRANT OPTION;"),
            Some("REVOKE SELECT,INSERT ON TABLE public.orders FROM app;".to_string())
        );
        assert_eq!(revoke_for("REVOKE ALL ON TABLE public.orders FROM PUBLIC;"), None);
        assert_eq!(
            revoke_for("GRANT SELECT ON TABLE public.orders TO app -- reporting\n;"),
            Some("REVOKE SELECT ON TABLE public.orders FROM app;".to_string())
        );
    }
}
