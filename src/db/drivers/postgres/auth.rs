// PostgreSQL Authentication
// Owns the bb8 pool built from a postgres:// URI and verifies credentials with SELECT 1

use std::sync::Arc;
use std::time::Duration;

use bb8_postgres::PostgresConnectionManager;
use tokio_postgres::NoTls;

use crate::db::pool::{DriverSlot, ManagedPool, PoolSettings};
use crate::db::traits::{Authenticator, DatabaseError, DatabaseType};
use crate::db::types::{check_config, AuthConfig};

pub type PostgresPool = ManagedPool<PostgresConnectionManager<NoTls>>;

const POOL_SETTINGS: PoolSettings = PoolSettings {
    max_size: 10,
    acquire_timeout: Duration::from_secs(60),
};
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const APPLICATION_NAME: &str = "dashquery";

fn invalid_uri(detail: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::InvalidConfig(format!("Invalid PostgreSQL URI: {}", detail))
}

/// Parse `postgres://[user[:password]@]host[:port]/database` into a client config.
///
/// Credentials from the auth config win over any embedded in the URI.
pub fn pg_config(config: &AuthConfig) -> Result<tokio_postgres::Config, DatabaseError> {
    let url = url::Url::parse(config.uri()).map_err(invalid_uri)?;
    if !matches!(url.scheme(), "postgres" | "postgresql") {
        return Err(invalid_uri(format!("unsupported scheme '{}'", url.scheme())));
    }
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid_uri("missing host"))?;

    let mut pg = tokio_postgres::Config::new();
    pg.host(host.trim_start_matches('[').trim_end_matches(']'))
        .port(url.port().unwrap_or(DatabaseType::Postgresql.default_port()))
        .connect_timeout(CONNECT_TIMEOUT)
        .application_name(APPLICATION_NAME);

    let database = url.path().trim_start_matches('/');
    if !database.is_empty() {
        pg.dbname(database);
    }
    if !config.username.is_empty() {
        pg.user(&config.username);
    } else if !url.username().is_empty() {
        pg.user(url.username());
    }
    if !config.password.is_empty() {
        pg.password(&config.password);
    } else if let Some(password) = url.password() {
        pg.password(password);
    }
    Ok(pg)
}

fn build_pool(config: &AuthConfig) -> Result<PostgresPool, DatabaseError> {
    let pg = pg_config(config)?;
    let manager = PostgresConnectionManager::new(pg, NoTls);
    Ok(ManagedPool::build(manager, POOL_SETTINGS, "postgresql"))
}

pub struct PostgresAuthenticator {
    slot: DriverSlot<PostgresPool>,
}

impl PostgresAuthenticator {
    /// Validate `config` and create the pool. Needs a running Tokio runtime.
    pub fn new(config: Option<&AuthConfig>) -> Result<Self, DatabaseError> {
        let config = check_config(config)?;
        let pool = build_pool(config)?;
        Ok(Self {
            slot: DriverSlot::new(config.clone(), pool),
        })
    }

    /// Like [`Authenticator::verify_authentication`], with every failure reported as `false`.
    pub async fn authenticate(&self) -> bool {
        match self.verify_authentication().await {
            Ok(valid) => valid,
            Err(e) => {
                tracing::debug!(error = %e, "PostgreSQL authentication failed");
                false
            }
        }
    }

    /// Shut the pool down. Safe to call more than once.
    pub async fn close(&self) {
        if let Some(pool) = self.slot.take().await {
            pool.close();
            tracing::info!("PostgreSQL pool closed");
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for PostgresAuthenticator {
    type Driver = PostgresPool;

    fn create_driver(&self, config: &AuthConfig) -> Result<PostgresPool, DatabaseError> {
        build_pool(config)
    }

    async fn driver(&self) -> Result<Arc<PostgresPool>, DatabaseError> {
        self.slot.driver().await
    }

    async fn auth_config(&self) -> AuthConfig {
        self.slot.config().await
    }

    async fn verify_authentication(&self) -> Result<bool, DatabaseError> {
        let pool = self.driver().await?;
        let attempt = async {
            let client = pool.dedicated().await?;
            client.simple_query("SELECT 1").await?;
            Ok::<_, DatabaseError>(())
        };
        match attempt.await {
            Ok(()) => Ok(true),
            Err(e) if e.is_auth_failure() => {
                tracing::debug!(error = %e, "PostgreSQL rejected credentials");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_auth_config(&self, config: Option<&AuthConfig>) -> Result<(), DatabaseError> {
        let config = check_config(config)?;
        let pool = self.create_driver(config)?;
        if let Some(old) = self.slot.replace(config.clone(), pool).await {
            old.close();
        }
        tracing::info!("PostgreSQL credentials rotated");
        Ok(())
    }
}
