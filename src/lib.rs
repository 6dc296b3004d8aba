//! # pgdrift
//!
//! Schema drift detection and migration script generation for PostgreSQL.
//!
//! pgdrift provides:
//! - Snapshots of the tables, views and routines of two databases
//! - A diff engine that drops, creates and alters objects in dependency-safe order
//! - One transactional, commented migration script per diff
//! - A `tokio-postgres` + `pg_dump` collaborator (feature `postgres`, on by default)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pgdrift::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = PgConnection::connect_url("postgresql://localhost/shop_dev").await?;
//!     let target = PgConnection::connect_url("postgresql://localhost/shop_prod").await?;
//!
//!     let differ = SchemaDiffer::new(DiffConfig::load("pgdrift.toml")?);
//!     match differ.diff(&source, &target, "release 42").await? {
//!         Some(script) => println!("{}", script.dry_run_text()),
//!         None => println!("No differences"),
//!     }
//!
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// The diff engine.
pub mod diff {
    pub use pgdrift_diff::*;
}

/// The PostgreSQL collaborator.
#[cfg(feature = "postgres")]
#[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
pub mod postgres {
    pub use pgdrift_postgres::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::diff::{
        Connection, DiffConfig, DiffError, DiffResult, DumpOptions, MemoryConnection,
        MigrationScript, SchemaDiffer, SchemaFilter, ScriptExecutor, Section,
    };
    #[cfg(feature = "postgres")]
    pub use crate::postgres::{PgConfig, PgConnection};
}

// Re-export key types at the crate root
pub use diff::{DiffConfig, DiffError, DiffResult, MigrationScript, SchemaDiffer};
