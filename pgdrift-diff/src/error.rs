//! Error types for the diff engine.

use thiserror::Error;

/// Result type alias for diff operations.
pub type DiffResult<T> = Result<T, DiffError>;

/// Errors that can occur while building or applying a schema diff.
///
/// Reference detection never produces an error: it is best-effort and only
/// influences statement ordering.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A metadata query, DDL retrieval or connection attempt failed.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The DDL text of an object could not be turned into a structured form.
    #[error("Malformed DDL for {object}: {reason}")]
    MalformedDdl {
        /// Object whose DDL was rejected.
        object: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Candidates reference each other and strict cycle handling is enabled.
    #[error("Dependency cycle between {kind}: {}", .members.join(" <-> "))]
    DependencyCycle {
        /// Kind of the objects in the cycle (tables, views, routines).
        kind: String,
        /// Objects taking part in the cycle.
        members: Vec<String>,
    },

    /// The executor rejected the generated script.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DiffError {
    /// Create a connectivity error.
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a malformed DDL error.
    pub fn malformed_ddl(object: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedDdl {
            object: object.into(),
            reason: reason.into(),
        }
    }

    /// Create a dependency cycle error.
    pub fn dependency_cycle(kind: impl Into<String>, members: Vec<String>) -> Self {
        Self::DependencyCycle {
            kind: kind.into(),
            members,
        }
    }

    /// Create an execution error.
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Check if this error came from talking to a database.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }

    /// Check if this error was raised by the executor.
    pub fn is_execution(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Check if this error aborts a diff run.
    ///
    /// Execution failures happen after a script was produced, so the script
    /// itself remains valid.
    pub fn is_fatal(&self) -> bool {
        !self.is_execution()
    }
}

impl From<toml::de::Error> for DiffError {
    fn from(err: toml::de::Error) -> Self {
        DiffError::Config(format!("Failed to parse TOML: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_ddl_display() {
        let err = DiffError::malformed_ddl("public.orders", "unbalanced column list");
        let msg = err.to_string();
        assert!(msg.contains("public.orders"));
        assert!(msg.contains("unbalanced column list"));
    }

    #[test]
    fn test_dependency_cycle_display() {
        let err = DiffError::dependency_cycle(
            "views",
            vec!["public.a".to_string(), "public.b".to_string()],
        );
        assert_eq!(
            err.to_string(),
            "Dependency cycle between views: public.a <-> public.b"
        );
    }

    #[test]
    fn test_error_kinds() {
        assert!(DiffError::connectivity("connection refused").is_connectivity());
        assert!(DiffError::execution("syntax error").is_execution());
        assert!(!DiffError::config("bad").is_connectivity());
        assert!(DiffError::malformed_ddl("v", "empty").is_fatal());
        assert!(!DiffError::execution("deadlock").is_fatal());
    }
}
