//! # pgdrift-postgres
//!
//! PostgreSQL collaborator for the pgdrift diff engine.
//!
//! This crate provides:
//! - [`PgConnection`], a [`Connection`](pgdrift_diff::Connection) that reads the
//!   catalog over `tokio-postgres` and relation DDL through `pg_dump`
//! - Script execution through the same connection
//!   ([`ScriptExecutor`](pgdrift_diff::ScriptExecutor))
//! - URL-based configuration with an overridable `pg_dump` binary
//!
//! ## Example
//!
//! ```rust,ignore
//! use pgdrift_diff::{DiffConfig, SchemaDiffer};
//! use pgdrift_postgres::PgConnection;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = PgConnection::connect_url("postgresql://app@localhost/shop_dev")
//!         .await?
//!         .with_name("dev");
//!     let target = PgConnection::connect_url("postgresql://app@localhost/shop_staging")
//!         .await?
//!         .with_name("staging");
//!
//!     let differ = SchemaDiffer::new(DiffConfig::default());
//!     if let Some(script) = differ.diff(&source, &target, "staging sync").await? {
//!         println!("{}", script);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dump;
pub mod error;
pub mod queries;

pub use config::{PgConfig, PgConfigBuilder, SslMode};
pub use connection::PgConnection;
pub use dump::PgDump;
pub use error::{PgError, PgResult};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{PgConfig, PgConfigBuilder};
    pub use crate::connection::PgConnection;
    pub use crate::error::{PgError, PgResult};
}
