// Neo4j Connection Module
// Runs Cypher in read or write transactions over pooled Bolt connections

use std::time::Duration;

use crate::bolt::{bolt_parameters, BoltDict, BoltValue, TxConfig};
use crate::db::query::{drive, QueryOutcome, QueryRequest, RawResult};
use crate::db::traits::{Authenticator, ConnectionModule, DatabaseError, DatabaseType};
use crate::db::types::{AccessMode, AuthConfig, ConnectionConfig};

use super::auth::Neo4jAuthenticator;
use super::records::Neo4jRecordNormalizer;

pub struct Neo4jConnectionModule {
    auth: Neo4jAuthenticator,
    normalizer: Neo4jRecordNormalizer,
}

impl Neo4jConnectionModule {
    pub fn new(config: Option<&AuthConfig>) -> Result<Self, DatabaseError> {
        Ok(Self {
            auth: Neo4jAuthenticator::new(config)?,
            normalizer: Neo4jRecordNormalizer,
        })
    }

    pub fn authenticator(&self) -> &Neo4jAuthenticator {
        &self.auth
    }

    /// Run `query` in one transaction and collect every row.
    ///
    /// The pooled connection goes back to the pool when it drops, on every exit path.
    pub async fn execute(
        &self,
        query: &str,
        parameters: BoltDict,
        config: &ConnectionConfig,
    ) -> Result<RawResult<BoltValue>, DatabaseError> {
        let driver = self.auth.driver().await?;
        let mut connection = driver.get().await?;
        let tx = TxConfig {
            read_only: config.access_mode == AccessMode::Read,
            database: config.database.clone(),
            timeout: Some(Duration::from_millis(config.connection_timeout)),
        };
        let result = connection.run_in_transaction(query, parameters, &tx).await?;
        Ok(RawResult {
            fields: result.fields.into(),
            rows: result.records,
            columns: Vec::new(),
        })
    }
}

#[async_trait::async_trait]
impl ConnectionModule for Neo4jConnectionModule {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Neo4j
    }

    async fn run_query(&self, request: QueryRequest) -> QueryOutcome {
        let parameters = bolt_parameters(request.params.params.as_ref());
        let execution = self.execute(&request.params.query, parameters, &request.config);
        drive(&self.normalizer, &request, execution).await
    }

    async fn check_connection(&self, config: &ConnectionConfig) -> Result<bool, DatabaseError> {
        if !self.auth.verify_authentication().await? {
            return Ok(false);
        }
        let read_check = ConnectionConfig {
            access_mode: AccessMode::Read,
            ..config.clone()
        };
        self.execute("RETURN 1", BoltDict::new(), &read_check).await?;
        Ok(true)
    }

    async fn update_auth_config(&self, config: Option<&AuthConfig>) -> Result<(), DatabaseError> {
        self.auth.update_auth_config(config).await
    }
}
