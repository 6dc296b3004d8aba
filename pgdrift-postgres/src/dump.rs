//! Raw DDL text.
//!
//! Relations are dumped with `pg_dump --schema-only --table`, one object per
//! invocation. Routines are read with `pg_get_functiondef`, since `pg_dump`
//! cannot select a single function.

use std::process::Stdio;

use pgdrift_diff::key::{quote_identifier, quote_literal, schema_identifier};
use pgdrift_diff::{RoutineDescriptor, TableDescriptor};
use tokio::process::Command;
use tracing::debug;

use crate::config::PgConfig;
use crate::error::{PgError, PgResult};

/// Runs `pg_dump` against one database.
#[derive(Debug, Clone)]
pub struct PgDump {
    config: PgConfig,
}

impl PgDump {
    /// Create a runner for the database described by `config`.
    pub fn new(config: PgConfig) -> Self {
        Self { config }
    }

    /// Command-line arguments for dumping one relation.
    pub fn args(&self, table: &TableDescriptor) -> Vec<String> {
        vec![
            "--schema-only".to_string(),
            "--no-tablespaces".to_string(),
            format!("--host={}", self.config.host),
            format!("--port={}", self.config.port),
            format!("--username={}", self.config.user),
            format!("--dbname={}", self.config.database),
            format!("--table={}", table_pattern(table)),
        ]
    }

    /// Dump the DDL of one table or view.
    pub async fn relation(&self, table: &TableDescriptor) -> PgResult<Vec<String>> {
        let object = table.key().to_string();
        let args = self.args(table);
        debug!(program = %self.config.pg_dump.display(), object = %object, "Running pg_dump");

        let mut command = Command::new(&self.config.pg_dump);
        command
            .args(&args)
            .env("PGSSLMODE", self.config.ssl_mode.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(password) = &self.config.password {
            command.env("PGPASSWORD", password);
        }
        if let Some(name) = &self.config.application_name {
            command.env("PGAPPNAME", name);
        }

        let output = command
            .output()
            .await
            .map_err(|e| PgError::dump(&object, format!("failed to run pg_dump: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PgError::dump(
                &object,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| PgError::dump(&object, format!("output is not UTF-8: {}", e)))?;
        Ok(stdout.lines().map(str::to_string).collect())
    }
}

/// `pg_dump --table` pattern matching exactly one relation.
pub fn table_pattern(table: &TableDescriptor) -> String {
    format!(
        "{}.{}",
        quote_identifier(&table.schema),
        quote_identifier(&table.name)
    )
}

/// DDL lines of a routine from its catalog definition.
///
/// `pg_get_functiondef` output carries no trailing semicolon, so one is added
/// to the definition. The comment, if any, becomes a `COMMENT ON` statement of
/// its own.
pub fn routine_lines(
    routine: &RoutineDescriptor,
    definition: &str,
    identity_arguments: &str,
    comment: Option<&str>,
) -> Vec<String> {
    let mut lines: Vec<String> = definition.trim_end().lines().map(str::to_string).collect();
    if let Some(last) = lines.last_mut() {
        if !last.trim_end().ends_with(';') {
            last.push(';');
        }
    }
    if let Some(comment) = comment {
        lines.push(format!(
            "COMMENT ON {} {}.{}({}) IS {};",
            routine.kind.to_sql(),
            schema_identifier(&routine.schema),
            quote_identifier(&routine.name),
            identity_arguments,
            quote_literal(comment)
        ));
    }
    lines
}
