// Backend Traits
// Core abstractions every backend implements: authentication, query execution,
// record normalization and schema introspection

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_postgres::error::SqlState;

use crate::bolt::{BoltError, BoltErrorExt};
use crate::db::query::{QueryOutcome, QueryRequest, RawResult, ResultSchema};
use crate::db::record::{Record, Value};
use crate::db::types::{AuthConfig, ConnectionConfig, DatabaseSchema};

/// Supported database types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Neo4j,
    Postgresql,
}

impl DatabaseType {
    pub const ALL: [DatabaseType; 2] = [DatabaseType::Neo4j, DatabaseType::Postgresql];

    /// Parse a backend tag such as `"neo4j"` or `"postgresql"`
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "neo4j" => Some(DatabaseType::Neo4j),
            "postgresql" => Some(DatabaseType::Postgresql),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            DatabaseType::Neo4j => "neo4j",
            DatabaseType::Postgresql => "postgresql",
        }
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            DatabaseType::Neo4j => "Neo4j",
            DatabaseType::Postgresql => "PostgreSQL",
        }
    }

    /// Default port for the database type
    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseType::Neo4j => crate::bolt::connection::DEFAULT_PORT,
            DatabaseType::Postgresql => 5432,
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Fixed validation messages, surfaced verbatim
    #[error("{0}")]
    InvalidConfig(String),

    #[error("Unsupported connection type: {0}")]
    UnsupportedType(String),

    #[error(transparent)]
    Bolt(#[from] BoltError),

    #[error(transparent)]
    Postgres(#[from] tokio_postgres::Error),

    #[error("Timed out waiting for a pooled connection")]
    PoolTimeout,

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Schema error: {0}")]
    SchemaError(String),
}

const PG_AUTH_FAILURES: [SqlState; 3] = [
    SqlState::INVALID_PASSWORD,
    SqlState::INVALID_AUTHORIZATION_SPECIFICATION,
    SqlState::INVALID_CATALOG_NAME,
];

const PG_TIMEOUTS: [SqlState; 3] = [
    SqlState::QUERY_CANCELED,
    SqlState::ADMIN_SHUTDOWN,
    SqlState::IDLE_IN_TRANSACTION_SESSION_TIMEOUT,
];

/// Server messages naming one of the PostgreSQL timeout settings.
fn is_timeout_message(message: &str) -> bool {
    let message = message.to_lowercase();
    ["statement timeout", "lock timeout", "transaction timeout", "session timeout"]
        .iter()
        .any(|setting| message.contains(setting))
}

fn is_io_timeout(error: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = Some(error);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return io.kind() == std::io::ErrorKind::TimedOut;
        }
        source = err.source();
    }
    false
}

impl DatabaseError {
    /// True when the credentials (or the database they name) were rejected
    pub fn is_auth_failure(&self) -> bool {
        match self {
            DatabaseError::Bolt(e) => e.is_auth_failure(),
            DatabaseError::Postgres(e) => e.code().map(|code| PG_AUTH_FAILURES.contains(code)).unwrap_or(false),
            _ => false,
        }
    }

    /// True when the server gave up on the query because it ran too long
    pub fn is_timeout(&self) -> bool {
        match self {
            DatabaseError::Bolt(e) => e.is_timeout(),
            DatabaseError::Postgres(e) => match e.as_db_error() {
                Some(db) => PG_TIMEOUTS.contains(db.code()) || is_timeout_message(db.message()),
                None => is_io_timeout(e),
            },
            _ => false,
        }
    }
}

impl<E> From<bb8::RunError<E>> for DatabaseError
where
    DatabaseError: From<E>,
{
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::User(e) => DatabaseError::from(e),
            bb8::RunError::TimedOut => DatabaseError::PoolTimeout,
        }
    }
}

/// Owns the driver or pool of one backend and answers "are these credentials valid?"
#[async_trait::async_trait]
pub trait Authenticator: Send + Sync {
    type Driver: Send + Sync + 'static;

    /// Build a fresh driver for `config`. Does not touch the current one.
    fn create_driver(&self, config: &AuthConfig) -> Result<Self::Driver, DatabaseError>;

    /// The current driver. In-flight work keeps its handle across rotations.
    async fn driver(&self) -> Result<Arc<Self::Driver>, DatabaseError>;

    async fn auth_config(&self) -> AuthConfig;

    /// `Ok(false)` when the credentials are rejected, `Err` for any other failure.
    async fn verify_authentication(&self) -> Result<bool, DatabaseError>;

    /// Validate `config`, then replace the current driver with one built from it.
    async fn update_auth_config(&self, config: Option<&AuthConfig>) -> Result<(), DatabaseError>;
}

/// Executes queries against one backend
#[async_trait::async_trait]
pub trait ConnectionModule: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    fn driver_name(&self) -> &'static str {
        self.database_type().display_name()
    }

    /// Run one query. Never returns an error; failures come back as [`QueryOutcome::Failure`].
    async fn run_query(&self, request: QueryRequest) -> QueryOutcome;

    /// Lightweight liveness check. `Ok(false)` for rejected credentials.
    async fn check_connection(&self, config: &ConnectionConfig) -> Result<bool, DatabaseError>;

    async fn update_auth_config(&self, config: Option<&AuthConfig>) -> Result<(), DatabaseError>;
}

/// Converts backend-native values into canonical [`Value`]s.
///
/// `normalize_value` checks, in order: null, primitive, temporal, graph
/// object, list, map, and finally falls back to `passthrough`.
pub trait RecordNormalizer: Send + Sync {
    type Native: Send + Sync + 'static;

    fn is_null(&self, value: &Self::Native) -> bool;

    fn convert_primitive(&self, value: &Self::Native) -> Option<Value>;

    fn convert_temporal(&self, value: &Self::Native) -> Option<Value>;

    fn convert_graph_object(&self, _value: &Self::Native) -> Option<Value> {
        None
    }

    fn list_items<'a>(&self, value: &'a Self::Native) -> Option<&'a [Self::Native]>;

    fn map_entries<'a>(&self, value: &'a Self::Native) -> Option<Vec<(&'a str, &'a Self::Native)>>;

    fn passthrough(&self, value: &Self::Native) -> Value;

    fn normalize_value(&self, value: &Self::Native) -> Value {
        if self.is_null(value) {
            return Value::Null;
        }
        if let Some(v) = self.convert_primitive(value) {
            return v;
        }
        if let Some(v) = self.convert_temporal(value) {
            return v;
        }
        if let Some(v) = self.convert_graph_object(value) {
            return v;
        }
        if let Some(items) = self.list_items(value) {
            return Value::List(items.iter().map(|item| self.normalize_value(item)).collect());
        }
        if let Some(entries) = self.map_entries(value) {
            return Value::Map(
                entries
                    .into_iter()
                    .map(|(key, v)| (key.to_string(), self.normalize_value(v)))
                    .collect(),
            );
        }
        self.passthrough(value)
    }

    fn to_record(&self, fields: &[String], values: &[Self::Native]) -> Record {
        fields
            .iter()
            .zip(values)
            .map(|(field, value)| (field.clone(), self.normalize_value(value)))
            .collect()
    }

    /// Structural description of a result, built from the raw rows.
    fn result_schema(&self, result: &RawResult<Self::Native>) -> ResultSchema;
}

/// One-shot structural introspection
#[async_trait::async_trait]
pub trait SchemaManager: Send + Sync {
    fn database_type(&self) -> DatabaseType;

    async fn fetch_schema(&self, config: &AuthConfig) -> Result<DatabaseSchema, DatabaseError>;
}
