//! Create resolution.
//!
//! Source objects absent from the target (and views or routines whose
//! definition changed) are created with every referenced batch member
//! emitted before the object that references it.

use indexmap::IndexMap;
use tracing::debug;

use crate::batch::{BatchItem, Direction, order_batch};
use crate::config::DiffConfig;
use crate::dump::AppendKind;
use crate::error::DiffResult;
use crate::key::{ObjectKind, RoutineKey, TableKey, schema_identifier};
use crate::reference::Candidate;
use crate::snapshot::{RoutineDescriptor, Snapshot};
use crate::statements::Statements;

/// A routine to create, with its DDL.
#[derive(Debug, Clone)]
pub struct RoutineCandidate {
    /// The routine as listed by the source.
    pub routine: RoutineDescriptor,
    /// Source DDL lines.
    pub lines: Vec<String>,
    /// The routine exists in the target with another definition.
    pub replace: bool,
}

/// Resolves the create side of a diff.
pub struct CreateResolver<'a> {
    config: &'a DiffConfig,
}

impl<'a> CreateResolver<'a> {
    /// Create a resolver.
    pub fn new(config: &'a DiffConfig) -> Self {
        Self { config }
    }

    /// Create schemas missing from the target.
    pub fn create_schemas(&self, source: &Snapshot, target: &Snapshot, out: &mut Statements) {
        for schema in &source.schemas {
            if !target.schemas.contains(schema) {
                debug!(schema = %schema, "Creating schema");
                out.create_schemas.push(format!(
                    "CREATE SCHEMA IF NOT EXISTS {};",
                    schema_identifier(schema)
                ));
            }
        }
    }

    /// Create tables from their source DDL.
    ///
    /// Bare `CREATE TABLE` statements come first, then every primary key and
    /// unique fragment, then the remaining fragments. Indexes, grants and
    /// comments go to their own sections.
    pub fn create_tables(
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
            .map(|(key, lines)| (key, BatchItem::new(ObjectKind::Table, lines)))
            .collect();

        let ordered = order_batch(
            "tables",
            batch,
            &references,
            &self.config.dump,
            Direction::DependenciesFirst,
            self.config.strict_cycles,
        )?;

        for (key, rep) in ordered.items {
            debug!(table = %key, append = rep.append.len(), "Creating table");
            out.create_tables.extend(rep.create);
            for statement in rep.append {
                match AppendKind::of(&statement) {
                    AppendKind::Grant => out.table_grants.push(statement),
                    AppendKind::Comment => out.table_comments.push(statement),
                    AppendKind::Unique => out.unique.push(statement),
                    AppendKind::Index => out.alter_indexes.push(statement),
                    AppendKind::Other => out.create.push(statement),
                }
            }
        }
        Ok(ordered.warnings)
    }

    /// Create views from their source DDL, referenced views first.
    pub fn create_views(
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
            .map(|(key, lines)| (key, BatchItem::new(ObjectKind::View, lines)))
            .collect();

        let ordered = order_batch(
            "views",
            batch,
            &references,
            &self.config.dump,
            Direction::DependenciesFirst,
            self.config.strict_cycles,
        )?;

        for (key, rep) in ordered.items {
            debug!(view = %key, "Creating view");
            out.create_views.extend(rep.create);
            out.create_views.extend(rep.append);
        }
        Ok(ordered.warnings)
    }

    /// Create routines from their source DDL, called routines first.
    ///
    /// Changed routines are written as `CREATE OR REPLACE`.
    pub fn create_routines(
        &self,
        candidates: IndexMap<RoutineKey, RoutineCandidate>,
        out: &mut Statements,
    ) -> DiffResult<Vec<String>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let references: Vec<_> = candidates
            .iter()
            .map(|(key, candidate)| Candidate::routine(key.clone(), &candidate.routine))
            .collect();
        let batch = candidates
            .into_iter()
            .map(|(key, candidate)| {
                let item = BatchItem::new(candidate.routine.kind, candidate.lines)
                    .force_or_replace(candidate.replace);
                (key, item)
            })
            .collect();

        let ordered = order_batch(
            "routines",
            batch,
            &references,
            &self.config.dump,
            Direction::DependenciesFirst,
            self.config.strict_cycles,
        )?;

        for (key, rep) in ordered.items {
            debug!(routine = %key, "Creating routine");
            out.create_routines.extend(rep.create);
            out.create_routines.extend(rep.append);
        }
        Ok(ordered.warnings)
    }
}
