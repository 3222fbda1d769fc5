// Bolt Connection Pooling
// bb8 manager so graph connections are pooled the same way as PostgreSQL ones

use std::time::Duration;

use bb8::{ManageConnection, Pool};
use boltr::error::BoltError;

use super::connection::{BoltAuth, BoltClient, BoltTarget};

pub type BoltPool = Pool<BoltConnectionManager>;

#[derive(Debug, Clone)]
pub struct BoltConnectionManager {
    target: BoltTarget,
    auth: BoltAuth,
    connect_timeout: Duration,
}

impl BoltConnectionManager {
    pub fn new(target: BoltTarget, auth: BoltAuth, connect_timeout: Duration) -> Self {
        Self {
            target,
            auth,
            connect_timeout,
        }
    }

    pub fn target(&self) -> &BoltTarget {
        &self.target
    }
}

#[async_trait::async_trait]
impl ManageConnection for BoltConnectionManager {
    type Connection = BoltClient;
    type Error = BoltError;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        BoltClient::connect(&self.target, &self.auth, self.connect_timeout).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.reset().await
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_broken()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::testing::{Event, FakeBoltServer, Reply};
    use crate::bolt::{BoltDict, BoltValue, TxConfig};

    #[tokio::test]
    async fn test_pool_reuses_connections() {
        let server = FakeBoltServer::start(|_| Reply::rows(&["one"], vec![vec![BoltValue::Integer(1)]])).await;
        let manager = BoltConnectionManager::new(
            BoltTarget::parse(&server.uri()).unwrap(),
            BoltAuth::None,
            Duration::from_secs(5),
        );
        let pool = Pool::builder().max_size(1).build(manager).await.unwrap();

        for _ in 0..3 {
            let mut conn = pool.get().await.unwrap();
            let result = conn
                .run_in_transaction("RETURN 1 AS one", BoltDict::new(), &TxConfig::default())
                .await
                .unwrap();
            assert_eq!(result.records.len(), 1);
        }

        let sessions = server.events().iter().filter(|e| **e == Event::Session).count();
        assert_eq!(sessions, 1);
        assert_eq!(server.queries().len(), 3);
    }
}
