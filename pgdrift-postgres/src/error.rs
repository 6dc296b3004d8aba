//! Error types for PostgreSQL operations.

use pgdrift_diff::DiffError;
use thiserror::Error;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Error, Debug)]
pub enum PgError {
    /// PostgreSQL error.
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// Catalog query returned something unexpected.
    #[error("query error: {0}")]
    Query(String),

    /// `pg_dump` failed for an object.
    #[error("pg_dump failed for {object}: {message}")]
    Dump {
        /// The object being dumped.
        object: String,
        /// What went wrong.
        message: String,
    },

    /// Script execution error.
    #[error("execution error: {0}")]
    Execution(String),
}

impl PgError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a `pg_dump` error.
    pub fn dump(object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dump {
            object: object.into(),
            message: message.into(),
        }
    }

    /// Create an execution error.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Postgres(e) => e.is_closed(),
            _ => false,
        }
    }
}

impl From<PgError> for DiffError {
    fn from(err: PgError) -> Self {
        match err {
            PgError::Config(msg) => DiffError::Config(msg),
            PgError::Execution(msg) => DiffError::Execution(msg),
            // Catalog queries and the DDL producer are both network collaborators.
            other => DiffError::Connectivity(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PgError::config("invalid URL");
        assert!(matches!(err, PgError::Config(_)));

        let err = PgError::connection("connection refused");
        assert!(err.is_connection_error());

        let err = PgError::dump("public.orders", "permission denied");
        assert_eq!(
            err.to_string(),
            "pg_dump failed for public.orders: permission denied"
        );
        assert!(!err.is_connection_error());
    }

    #[test]
    fn test_into_diff_error() {
        let err: DiffError = PgError::dump("public.orders", "exit status 1").into();
        assert!(err.is_connectivity());

        let err: DiffError = PgError::query("unexpected relkind").into();
        assert!(err.is_connectivity());

        let err: DiffError = PgError::execution("syntax error").into();
        assert!(err.is_execution());

        let err: DiffError = PgError::config("missing host").into();
        assert!(matches!(err, DiffError::Config(_)));
    }
}
