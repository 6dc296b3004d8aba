//! # pgdrift-diff
//!
//! Schema diff and migration-script assembly for PostgreSQL.
//!
//! This crate provides functionality for:
//! - Snapshotting the tables, views and routines of two databases
//! - Detecting which objects must be dropped, created or altered
//! - Ordering drops and creates so that referenced objects exist when needed
//! - Structural diffing of tables into minimal `ALTER TABLE` statements
//! - Assembling everything into one transactional, commented script
//!
//! ## Architecture
//!
//! The engine compares a *source* database (the desired state) with a
//! *target* database and generates the script that brings the target up to
//! date. It never talks to a server itself: catalog listings and raw DDL text
//! come through the [`Connection`] trait, and the finished script is handed
//! to a [`ScriptExecutor`].
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌─────────────────┐
//! │ Source conn  │────▶│ Snapshot       │────▶│ Drop / Create   │
//! └──────────────┘     │ Builder        │     │ Resolvers       │
//! ┌──────────────┐     │                │     ├─────────────────┤
//! │ Target conn  │────▶│                │────▶│ Table Differ    │
//! └──────────────┘     └────────────────┘     └─────────────────┘
//!                                                     │
//!                                                     ▼
//!                      ┌────────────────┐     ┌─────────────────┐
//!                      │ Executor       │◀────│ Script Assembler│
//!                      └────────────────┘     └─────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgdrift_diff::{DiffConfig, SchemaDiffer};
//!
//! async fn migrate(
//!     source: &dyn pgdrift_diff::Connection,
//!     target: &dyn pgdrift_diff::Connection,
//!     executor: &dyn pgdrift_diff::ScriptExecutor,
//! ) -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiffConfig::new()
//!         .include_schemas("^(public|billing)$")
//!         .strict_cycles(true);
//!     let differ = SchemaDiffer::new(config);
//!
//!     match differ.diff(source, target, "nightly sync").await? {
//!         Some(script) => {
//!             println!("{}", script.summary());
//!             differ.apply(&script, executor).await?;
//!         }
//!         None => println!("Databases are in sync"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Script Layout
//!
//! Statements are grouped into fixed regions; empty regions are left out:
//!
//! ```text
//! -- pgdrift migration: nightly sync
//! DO $pgdrift$
//! <<nightly_sync>>
//! BEGIN
//!
//! -- region Drop non-existing routines
//! DROP FUNCTION public."calc"(integer);
//! -- endregion Drop non-existing routines
//!
//! -- ROLLBACK;
//! END nightly_sync;
//! $pgdrift$;
//! ```

pub mod alter;
pub mod batch;
pub mod config;
pub mod connection;
pub mod create;
pub mod drop;
pub mod dump;
pub mod engine;
pub mod error;
pub mod key;
pub(crate) mod lexer;
pub mod memory;
pub mod order;
pub mod reference;
pub mod snapshot;
pub mod statements;

// Re-exports
pub use alter::TableDiffer;
pub use config::{DiffConfig, DumpOptions, SchemaFilter, SchemaMatcher};
pub use connection::{Connection, DdlTarget, ScriptExecutor};
pub use create::{CreateResolver, RoutineCandidate};
pub use drop::DropResolver;
pub use dump::{AppendKind, ConstraintDelta, DumpBuilder, DumpRepresentation, FieldDelta};
pub use engine::SchemaDiffer;
pub use error::{DiffError, DiffResult};
pub use key::{ObjectKind, RoutineKey, TableKey};
pub use memory::MemoryConnection;
pub use order::DependencyOrder;
pub use reference::{Candidate, ReferenceScanner};
pub use snapshot::{
    ForeignKeyRef, RoutineDescriptor, RoutineParameter, Snapshot, SnapshotBuilder,
    TableDescriptor,
};
pub use statements::{MigrationScript, ScriptAssembler, Section, Statements};
