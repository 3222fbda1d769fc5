// Neo4j Authentication
// Owns the Bolt connection pool and verifies credentials with a fresh handshake

use std::sync::Arc;
use std::time::Duration;

use crate::bolt::{BoltAuth, BoltConnectionManager, BoltTarget};
use crate::db::pool::{DriverSlot, ManagedPool, PoolSettings};
use crate::db::traits::{Authenticator, DatabaseError};
use crate::db::types::{check_config, AuthConfig, AuthType};

pub type Neo4jDriver = ManagedPool<BoltConnectionManager>;

const POOL_SETTINGS: PoolSettings = PoolSettings {
    max_size: 100,
    acquire_timeout: Duration::from_secs(60),
};
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct Neo4jAuthenticator {
    slot: DriverSlot<Neo4jDriver>,
}

impl Neo4jAuthenticator {
    /// Validate `config` and create the driver. Needs a running Tokio runtime.
    pub fn new(config: Option<&AuthConfig>) -> Result<Self, DatabaseError> {
        let config = check_config(config)?;
        let driver = build_driver(config)?;
        Ok(Self {
            slot: DriverSlot::new(config.clone(), driver),
        })
    }
}

fn bolt_auth(config: &AuthConfig) -> BoltAuth {
    match config.auth_type {
        Some(AuthType::Native) => BoltAuth::Basic {
            username: config.username.clone(),
            password: config.password.clone(),
        },
        _ => BoltAuth::None,
    }
}

fn build_driver(config: &AuthConfig) -> Result<Neo4jDriver, DatabaseError> {
    let target = BoltTarget::parse(config.uri()).map_err(DatabaseError::InvalidConfig)?;
    tracing::info!(address = %target.address(), "Creating Neo4j driver");
    let manager = BoltConnectionManager::new(target, bolt_auth(config), CONNECT_TIMEOUT);
    Ok(ManagedPool::build(manager, POOL_SETTINGS, "neo4j"))
}

#[async_trait::async_trait]
impl Authenticator for Neo4jAuthenticator {
    type Driver = Neo4jDriver;

    fn create_driver(&self, config: &AuthConfig) -> Result<Neo4jDriver, DatabaseError> {
        build_driver(config)
    }

    async fn driver(&self) -> Result<Arc<Neo4jDriver>, DatabaseError> {
        self.slot.driver().await
    }

    async fn auth_config(&self) -> AuthConfig {
        self.slot.config().await
    }

    async fn verify_authentication(&self) -> Result<bool, DatabaseError> {
        let driver = self.driver().await?;
        match driver.dedicated().await {
            Ok(connection) => {
                connection.close().await;
                Ok(true)
            }
            Err(e) if e.is_auth_failure() => {
                tracing::debug!(error = %e, "Neo4j rejected credentials");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn update_auth_config(&self, config: Option<&AuthConfig>) -> Result<(), DatabaseError> {
        let config = check_config(config)?;
        let driver = self.create_driver(config)?;
        if let Some(old) = self.slot.replace(config.clone(), driver).await {
            old.close();
        }
        tracing::info!("Neo4j credentials rotated");
        Ok(())
    }
}
