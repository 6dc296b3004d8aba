//! PostgreSQL connection.

use indexmap::IndexMap;
use pgdrift_diff::{
    Connection, DdlTarget, DiffError, DiffResult, ForeignKeyRef, RoutineDescriptor,
    ScriptExecutor, SchemaMatcher, TableDescriptor, TableKey,
};
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{debug, error, info};

use crate::config::{PgConfig, SslMode};
use crate::dump::{PgDump, routine_lines};
use crate::error::{PgError, PgResult};
use crate::queries::{self, RoutineRow};

/// A live connection to one database.
///
/// Catalog listings and routine definitions are read over the client; relation
/// DDL comes from `pg_dump`. The same connection can execute the generated
/// script.
pub struct PgConnection {
    name: String,
    client: Client,
    dump: PgDump,
}

impl PgConnection {
    /// Connect to the database described by `config`.
    ///
    /// The client connects without TLS, so `sslmode=require` is rejected up
    /// front. `pg_dump` still receives the configured mode.
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        if config.ssl_mode == SslMode::Require {
            return Err(PgError::config(format!(
                "sslmode=require is not supported for {}: the catalog client connects without TLS",
                config.display_url()
            )));
        }

        let (client, connection) = config
            .to_pg_config()
            .connect(NoTls)
            .await
            .map_err(|e| {
                PgError::connection(format!("failed to connect to {}: {}", config.display_url(), e))
            })?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "PostgreSQL connection error");
            }
        });

        info!(url = %config.display_url(), "Connected");
        Ok(Self {
            name: config.database.clone(),
            client,
            dump: PgDump::new(config),
        })
    }

    /// Connect using a database URL.
    pub async fn connect_url(url: impl Into<String>) -> PgResult<Self> {
        Self::connect(PgConfig::from_url(url)?).await
    }

    /// Use another name in logs.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the underlying client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> PgResult<Vec<Row>> {
        debug!(connection = %self.name, sql = %sql, "Executing catalog query");
        Ok(self.client.query(sql, params).await?)
    }

    async fn routine_ddl(&self, routine: &RoutineDescriptor) -> PgResult<Vec<String>> {
        let row = self
            .client
            .query_opt(
                queries::ROUTINE_DEFINITION,
                &[&routine.schema, &routine.specific_name],
            )
            .await?
            .ok_or_else(|| PgError::query(format!("routine {} not found", routine.key())))?;

        let definition: String = row.try_get(0)?;
        let identity_arguments: String = row.try_get(1)?;
        let comment: Option<String> = row.try_get(2)?;
        Ok(routine_lines(
            routine,
            &definition,
            &identity_arguments,
            comment.as_deref(),
        ))
    }
}

impl std::fmt::Debug for PgConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgConnection")
            .field("name", &self.name)
            .field("closed", &self.client.is_closed())
            .finish()
    }
}

fn routine_row(row: &Row) -> PgResult<RoutineRow> {
    Ok(RoutineRow {
        schema: row.try_get(0)?,
        specific_name: row.try_get(1)?,
        name: row.try_get(2)?,
        prokind: row.try_get(3)?,
        language: row.try_get(4)?,
        return_type: row.try_get(5)?,
        ordinal: row.try_get(6)?,
        parameter_name: row.try_get(7)?,
        data_type: row.try_get(8)?,
        type_name: row.try_get(9)?,
        is_array: row.try_get(10)?,
    })
}

#[async_trait::async_trait]
impl Connection for PgConnection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn schemas(&self, matcher: &SchemaMatcher) -> DiffResult<Vec<String>> {
        let rows = self.query(queries::SCHEMAS, &[]).await?;
        let mut schemas = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.try_get(0).map_err(PgError::from)?;
            if matcher.matches(&schema) {
                schemas.push(schema);
            }
        }
        Ok(schemas)
    }

    async fn relations(&self, matcher: &SchemaMatcher) -> DiffResult<Vec<TableDescriptor>> {
        let rows = self.query(queries::RELATIONS, &[]).await?;
        let mut relations = Vec::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.try_get(0).map_err(PgError::from)?;
            if !matcher.matches(&schema) {
                continue;
            }
            let name: String = row.try_get(1).map_err(PgError::from)?;
            let relkind: String = row.try_get(2).map_err(PgError::from)?;
            relations.push(queries::relation(schema, name, &relkind)?);
        }
        Ok(relations)
    }

    async fn routines(
        &self,
        matcher: &SchemaMatcher,
    ) -> DiffResult<IndexMap<String, Vec<RoutineDescriptor>>> {
        let rows = self.query(queries::ROUTINES, &[]).await?;
        let mut kept = Vec::with_capacity(rows.len());
        for row in &rows {
            let routine = routine_row(row)?;
            if matcher.matches(&routine.schema) {
                kept.push(routine);
            }
        }
        Ok(queries::group_routines(kept)?)
    }

    async fn foreign_keys(&self, tables: &[TableKey]) -> DiffResult<Vec<ForeignKeyRef>> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let schemas: Vec<String> = tables.iter().map(|t| t.schema.clone()).collect();
        let names: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();

        let rows = self
            .query(queries::FOREIGN_KEYS, &[&schemas, &names])
            .await?;
        let mut foreign_keys = Vec::with_capacity(rows.len());
        for row in rows {
            foreign_keys.push(ForeignKeyRef {
                schema: row.try_get(0).map_err(PgError::from)?,
                table: row.try_get(1).map_err(PgError::from)?,
                name: row.try_get(2).map_err(PgError::from)?,
            });
        }
        Ok(foreign_keys)
    }

    async fn ddl(&self, target: DdlTarget<'_>) -> DiffResult<Vec<String>> {
        let lines = match target {
            DdlTarget::Relation(table) => self.dump.relation(table).await?,
            DdlTarget::Routine(routine) => self.routine_ddl(routine).await?,
        };
        debug!(
            connection = %self.name,
            object = %target.display_name(),
            lines = lines.len(),
            "Fetched DDL"
        );
        Ok(lines)
    }
}

#[async_trait::async_trait]
impl ScriptExecutor for PgConnection {
    async fn execute_script(&self, script: &str) -> DiffResult<()> {
        info!(connection = %self.name, bytes = script.len(), "Executing migration script");
        self.client
            .batch_execute(script)
            .await
            .map_err(|e| DiffError::from(PgError::execution(e.to_string())))
    }
}
