// PostgreSQL Connection Module
// Runs SQL inside explicit transactions with a per-query statement timeout

use std::sync::Arc;

use indexmap::IndexMap;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Column};

use crate::db::query::{drive, FieldInfo, QueryOutcome, QueryRequest, RawResult};
use crate::db::traits::{Authenticator, ConnectionModule, DatabaseError, DatabaseType};
use crate::db::types::{AccessMode, AuthConfig, ConnectionConfig};

use super::auth::PostgresAuthenticator;
use super::params::{positional_values, SqlParam};
use super::records::{type_name, PgValue, PostgresRecordNormalizer};

impl From<&Column> for FieldInfo {
    fn from(column: &Column) -> Self {
        let ty = column.type_();
        Self {
            name: column.name().to_string(),
            type_oid: ty.oid(),
            data_type: type_name(ty.oid()).to_string(),
            native_type: ty.name().to_string(),
        }
    }
}

pub struct PostgresConnectionModule {
    auth: PostgresAuthenticator,
    normalizer: PostgresRecordNormalizer,
}

impl PostgresConnectionModule {
    pub fn new(config: Option<&AuthConfig>) -> Result<Self, DatabaseError> {
        Ok(Self {
            auth: PostgresAuthenticator::new(config)?,
            normalizer: PostgresRecordNormalizer,
        })
    }

    pub fn authenticator(&self) -> &PostgresAuthenticator {
        &self.auth
    }

    /// Run `query` in its own transaction on a pooled client.
    ///
    /// The client goes back to the pool when it drops, on every exit path.
    pub async fn execute(
        &self,
        query: &str,
        params: Option<&IndexMap<String, serde_json::Value>>,
        config: &ConnectionConfig,
    ) -> Result<RawResult<PgValue>, DatabaseError> {
        let pool = self.auth.driver().await?;
        let client = pool.get().await?;
        in_transaction(&*client, query, params, config).await
    }
}

/// The statements a query transaction needs from a PostgreSQL session.
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn batch_execute(&self, sql: &str) -> Result<(), DatabaseError>;

    /// Prepare `query`, bind `params` positionally and fetch every row.
    async fn query_rows(
        &self,
        query: &str,
        params: &[SqlParam<'_>],
    ) -> Result<(Vec<FieldInfo>, Vec<Vec<PgValue>>), DatabaseError>;
}

#[async_trait::async_trait]
impl SqlExecutor for Client {
    async fn batch_execute(&self, sql: &str) -> Result<(), DatabaseError> {
        Ok(Client::batch_execute(self, sql).await?)
    }

    async fn query_rows(
        &self,
        query: &str,
        params: &[SqlParam<'_>],
    ) -> Result<(Vec<FieldInfo>, Vec<Vec<PgValue>>), DatabaseError> {
        let statement = self.prepare(query).await?;
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
        let rows = self.query(&statement, &refs).await?;

        let columns = statement.columns().iter().map(FieldInfo::from).collect();
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| row.try_get::<_, PgValue>(i)).collect())
            .collect::<Result<Vec<Vec<PgValue>>, _>>()?;
        Ok((columns, rows))
    }
}

/// BEGIN, run, then COMMIT; ROLLBACK on any failure.
///
/// A failed rollback is logged and the original error returned.
pub async fn in_transaction<S: SqlExecutor + ?Sized>(
    session: &S,
    query: &str,
    params: Option<&IndexMap<String, serde_json::Value>>,
    config: &ConnectionConfig,
) -> Result<RawResult<PgValue>, DatabaseError> {
    let begin = match config.access_mode {
        AccessMode::Read => "BEGIN TRANSACTION READ ONLY",
        AccessMode::Write => "BEGIN",
    };
    session.batch_execute(begin).await?;

    match run(session, query, params, config).await {
        Ok(result) => {
            session.batch_execute("COMMIT").await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback) = session.batch_execute("ROLLBACK").await {
                tracing::warn!(error = %rollback, "Rollback failed");
            }
            Err(e)
        }
    }
}

async fn run<S: SqlExecutor + ?Sized>(
    session: &S,
    query: &str,
    params: Option<&IndexMap<String, serde_json::Value>>,
    config: &ConnectionConfig,
) -> Result<RawResult<PgValue>, DatabaseError> {
    session
        .batch_execute(&format!("SET statement_timeout = {}", config.timeout))
        .await?;

    let values = positional_values(params);
    let (columns, rows) = session.query_rows(query, &values).await?;
    let fields: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();
    Ok(RawResult { fields, rows, columns })
}

#[async_trait::async_trait]
impl ConnectionModule for PostgresConnectionModule {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Postgresql
    }

    async fn run_query(&self, request: QueryRequest) -> QueryOutcome {
        let execution = self.execute(&request.params.query, request.params.params.as_ref(), &request.config);
        drive(&self.normalizer, &request, execution).await
    }

    /// Invalid database names are reported as `false` (SQLSTATE 3D000 at connect).
    async fn check_connection(&self, config: &ConnectionConfig) -> Result<bool, DatabaseError> {
        if !self.auth.verify_authentication().await? {
            return Ok(false);
        }
        let read_check = ConnectionConfig {
            access_mode: AccessMode::Read,
            ..config.clone()
        };
        self.execute("SELECT 1", None, &read_check).await?;
        Ok(true)
    }

    async fn update_auth_config(&self, config: Option<&AuthConfig>) -> Result<(), DatabaseError> {
        self.auth.update_auth_config(config).await
    }
}
