//! Reference-ordered batches.
//!
//! A batch is the set of objects of one kind that a resolver is about to drop
//! or create. Each item's DDL is turned into a [`DumpRepresentation`] while a
//! [`ReferenceScanner`] watches its lines; the resulting reference sets then
//! decide the emission order.

use std::fmt::Display;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::config::DumpOptions;
use crate::dump::{DumpBuilder, DumpRepresentation};
use crate::error::DiffResult;
use crate::key::ObjectKind;
use crate::order::{dependencies_first, dependents_first};
use crate::reference::{Candidate, ReferenceScanner};

/// Raw DDL of one batch member.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Kind of the object.
    pub kind: ObjectKind,
    /// DDL lines as returned by the connection.
    pub lines: Vec<String>,
    /// Rewrite the creation statement as `CREATE OR REPLACE`.
    pub force_or_replace: bool,
}

impl BatchItem {
    /// Create an item.
    pub fn new(kind: ObjectKind, lines: Vec<String>) -> Self {
        Self {
            kind,
            lines,
            force_or_replace: false,
        }
    }

    /// Set `CREATE OR REPLACE` phrasing.
    pub fn force_or_replace(mut self, force: bool) -> Self {
        self.force_or_replace = force;
        self
    }
}

/// Emission direction of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Referenced objects first (creation).
    DependenciesFirst,
    /// Referencing objects first (removal).
    DependentsFirst,
}

/// A batch in emission order.
#[derive(Debug, Clone)]
pub struct OrderedBatch<K> {
    /// Members and their representations.
    pub items: Vec<(K, DumpRepresentation)>,
    /// Cycles broken while ordering.
    pub warnings: Vec<String>,
}

/// Build, scan and order a batch.
///
/// `candidates` lists what a member may reference; normally the batch itself.
pub fn order_batch<K>(
    label: &str,
    batch: IndexMap<K, BatchItem>,
    candidates: &[Candidate<K>],
    options: &DumpOptions,
    direction: Direction,
    strict_cycles: bool,
) -> DiffResult<OrderedBatch<K>>
where
    K: Clone + Eq + Hash + Display,
{
    let mut graph: IndexMap<K, IndexSet<K>> = IndexMap::with_capacity(batch.len());
    let mut reps: IndexMap<K, DumpRepresentation> = IndexMap::with_capacity(batch.len());

    for (key, item) in batch {
        let object = key.to_string();
        let mut scanner = ReferenceScanner::new(candidates, &key);
        let mut on_line = |line: &str| scanner.scan_line(line);
        let rep = DumpBuilder::new(item.kind, options)
            .force_or_replace(item.force_or_replace)
            .on_line(&mut on_line)
            .build(&object, &item.lines)?;
        let references = scanner.finish();

        debug!(object = %object, references = references.len(), "Scanned {}", label);
        graph.insert(key.clone(), references);
        reps.insert(key, rep);
    }

    let order = match direction {
        Direction::DependenciesFirst => dependencies_first(&graph),
        Direction::DependentsFirst => dependents_first(&graph),
    };
    let warnings = order.check_cycles(label, strict_cycles)?;

    let items = order
        .order
        .into_iter()
        .filter_map(|key| reps.swap_remove(&key).map(|rep| (key, rep)))
        .collect();

    Ok(OrderedBatch { items, warnings })
}
