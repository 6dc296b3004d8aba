//! Diff engine.
//!
//! [`SchemaDiffer`] drives one diff run: it snapshots both databases, fetches
//! the DDL of every object it needs to look at (all source queries, then all
//! target queries), resolves drops, alters and creates into a [`Statements`]
//! buffer and assembles the buffer into a [`MigrationScript`].

use std::fmt::Display;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::alter::TableDiffer;
use crate::config::DiffConfig;
use crate::connection::{Connection, DdlTarget, ScriptExecutor};
use crate::create::{CreateResolver, RoutineCandidate};
use crate::drop::DropResolver;
use crate::dump::DumpRepresentation;
use crate::error::{DiffError, DiffResult};
use crate::key::{ObjectKind, RoutineKey, TableKey};
use crate::snapshot::{Snapshot, SnapshotBuilder, difference, intersection};
use crate::statements::{MigrationScript, ScriptAssembler, Statements};

/// Which database a fetch is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Source,
    Target,
}

/// DDL lines fetched from one side.
#[derive(Debug, Default)]
struct DdlSet {
    views: IndexMap<TableKey, Vec<String>>,
    tables: IndexMap<TableKey, Vec<String>>,
    routines: IndexMap<RoutineKey, Vec<String>>,
}

fn lines_of<'a, K>(set: &'a IndexMap<K, Vec<String>>, key: &K) -> &'a [String]
where
    K: std::hash::Hash + Eq,
{
    set.get(key).map(Vec::as_slice).unwrap_or_default()
}

/// Computes and applies migration scripts between two databases.
///
/// The source is the desired state; the generated script turns the target
/// into it.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiffer {
    config: DiffConfig,
}

impl SchemaDiffer {
    /// Create a differ with the given configuration.
    pub fn new(config: DiffConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &DiffConfig {
        &self.config
    }

    /// Build the script that migrates `target` to `source`.
    ///
    /// Returns `Ok(None)` when both databases already match. Any connection
    /// or DDL failure aborts the run and no partial script is returned.
    pub async fn diff(
        &self,
        source: &dyn Connection,
        target: &dyn Connection,
        title: &str,
    ) -> DiffResult<Option<MigrationScript>> {
        info!(
            title = %title,
            source = source.name(),
            target = target.name(),
            "Computing schema diff"
        );

        let builder = SnapshotBuilder::new(&self.config);
        let source_snapshot = builder.build(source).await?;
        let target_snapshot = builder.build(target).await?;

        let source_ddl = self
            .fetch_ddl(source, Side::Source, &source_snapshot, &target_snapshot)
            .await?;
        let target_ddl = self
            .fetch_ddl(target, Side::Target, &target_snapshot, &source_snapshot)
            .await?;

        let mut out = Statements::new();
        let mut warnings = Vec::new();
        let drops = DropResolver::new(&self.config, &source_snapshot, &target_snapshot);
        let creates = CreateResolver::new(&self.config);

        drops.drop_routines(&mut out);

        let mut changed_views = IndexSet::new();
        for (key, _, _) in intersection(&source_snapshot.views, &target_snapshot.views) {
            let source_rep = self.representation(
                ObjectKind::View,
                key,
                lines_of(&source_ddl.views, key),
            )?;
            let target_rep = self.representation(
                ObjectKind::View,
                key,
                lines_of(&target_ddl.views, key),
            )?;
            if source_rep != target_rep {
                debug!(view = %key, "View changed");
                changed_views.insert(key.clone());
            }
        }

        let view_drops: IndexMap<TableKey, Vec<String>> = drops
            .missing_views()
            .into_iter()
            .chain(changed_views.iter())
            .map(|key| (key.clone(), lines_of(&target_ddl.views, key).to_vec()))
            .collect();
        warnings.extend(drops.drop_views(view_drops, &mut out)?);

        let differ = TableDiffer::new();
        for (key, _, _) in intersection(&source_snapshot.tables, &target_snapshot.tables) {
            let source_rep = self.representation(
                ObjectKind::Table,
                key,
                lines_of(&source_ddl.tables, key),
            )?;
            let target_rep = self.representation(
                ObjectKind::Table,
                key,
                lines_of(&target_ddl.tables, key),
            )?;
            differ.diff(key, &source_rep, &target_rep, &mut out);
        }

        drops.drop_tables(target, &mut out).await?;
        drops.drop_schemas(&mut out);

        creates.create_schemas(&source_snapshot, &target_snapshot, &mut out);

        let table_creates = difference(&source_snapshot.tables, &target_snapshot.tables)
            .map(|(key, _)| (key.clone(), lines_of(&source_ddl.tables, key).to_vec()))
            .collect();
        warnings.extend(creates.create_tables(table_creates, &mut out)?);

        let view_creates = source_snapshot
            .views
            .keys()
            .filter(|key| {
                !target_snapshot.views.contains_key(*key) || changed_views.contains(*key)
            })
            .map(|key| (key.clone(), lines_of(&source_ddl.views, key).to_vec()))
            .collect();
        warnings.extend(creates.create_views(view_creates, &mut out)?);

        let mut routine_creates = IndexMap::new();
        for (key, routine) in &source_snapshot.routines {
            let lines = lines_of(&source_ddl.routines, key);
            let replace = match target_snapshot.routines.get(key) {
                None => false,
                Some(_) if self.config.replace_routines => {
                    let source_rep = self.representation(routine.kind, key, lines)?;
                    let target_rep = self.representation(
                        routine.kind,
                        key,
                        lines_of(&target_ddl.routines, key),
                    )?;
                    if source_rep == target_rep {
                        continue;
                    }
                    debug!(routine = %key, "Routine changed");
                    true
                }
                Some(_) => continue,
            };
            routine_creates.insert(
                key.clone(),
                RoutineCandidate {
                    routine: routine.clone(),
                    lines: lines.to_vec(),
                    replace,
                },
            );
        }
        warnings.extend(creates.create_routines(routine_creates, &mut out)?);

        let mut assembler = ScriptAssembler::new(title).warnings(warnings);
        if let Some(label) = &self.config.block_label {
            assembler = assembler.label(label);
        }

        let script = assembler.assemble(&out);
        match &script {
            Some(script) => info!(summary = %script.summary(), "Schema diff computed"),
            None => info!(title = %title, "No schema differences"),
        }
        Ok(script)
    }

    /// Hand a script to an executor.
    ///
    /// The script must be unmodified since it was assembled.
    pub async fn apply(
        &self,
        script: &MigrationScript,
        executor: &dyn ScriptExecutor,
    ) -> DiffResult<()> {
        if !script.verify_checksum() {
            return Err(DiffError::execution(format!(
                "script '{}' was modified after it was generated",
                script.title
            )));
        }

        info!(
            title = %script.title,
            statements = script.statement_count(),
            checksum = %script.checksum,
            "Applying migration script"
        );
        executor.execute_script(&script.text).await
    }

    /// Fetch the DDL of every object of `snapshot` the diff will look at.
    ///
    /// Views are always fetched. The source also needs every table and the
    /// routines it may create; the target needs the tables and routines it
    /// shares with the source.
    async fn fetch_ddl(
        &self,
        conn: &dyn Connection,
        side: Side,
        snapshot: &Snapshot,
        other: &Snapshot,
    ) -> DiffResult<DdlSet> {
        let mut ddl = DdlSet::default();

        for (key, view) in &snapshot.views {
            ddl.views
                .insert(key.clone(), conn.ddl(DdlTarget::Relation(view)).await?);
        }

        for (key, table) in &snapshot.tables {
            if side == Side::Target && !other.tables.contains_key(key) {
                continue;
            }
            ddl.tables
                .insert(key.clone(), conn.ddl(DdlTarget::Relation(table)).await?);
        }

        for (key, routine) in &snapshot.routines {
            let shared = other.routines.contains_key(key);
            let needed = match side {
                Side::Source => !shared || self.config.replace_routines,
                Side::Target => shared && self.config.replace_routines,
            };
            if needed {
                ddl.routines
                    .insert(key.clone(), conn.ddl(DdlTarget::Routine(routine)).await?);
            }
        }

        debug!(
            connection = conn.name(),
            views = ddl.views.len(),
            tables = ddl.tables.len(),
            routines = ddl.routines.len(),
            "Fetched DDL"
        );
        Ok(ddl)
    }

    fn representation(
        &self,
        kind: ObjectKind,
        object: &impl Display,
        lines: &[String],
    ) -> DiffResult<DumpRepresentation> {
        DumpRepresentation::parse(kind, &object.to_string(), lines, &self.config.dump)
    }
}
