// Driver Ownership and Pooling
// Swappable driver slot plus the bb8 pool wrapper shared by both backends

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bb8::{ErrorSink, ManageConnection, Pool, PooledConnection};
use tokio::sync::RwLock;

use crate::db::traits::DatabaseError;
use crate::db::types::AuthConfig;

/// Pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub max_size: u32,
    /// How long a query waits for a free connection
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 10,
            acquire_timeout: Duration::from_secs(60),
        }
    }
}

/// Logs pool-level errors unless the pool is being shut down on purpose.
#[derive(Debug, Clone)]
pub struct PoolErrorLogger {
    backend: &'static str,
    closing: Arc<AtomicBool>,
}

impl<E: std::fmt::Display + 'static> ErrorSink<E> for PoolErrorLogger {
    fn sink(&self, error: E) {
        if self.closing.load(Ordering::Acquire) {
            return;
        }
        tracing::warn!(backend = self.backend, error = %error, "Connection pool error");
    }

    fn boxed_clone(&self) -> Box<dyn ErrorSink<E>> {
        Box::new(self.clone())
    }
}

/// A bb8 pool with an explicit "closing" signal for its error sink.
pub struct ManagedPool<M: ManageConnection> {
    pool: Pool<M>,
    closing: Arc<AtomicBool>,
}

impl<M> ManagedPool<M>
where
    M: ManageConnection,
    M::Error: std::fmt::Display,
    DatabaseError: From<M::Error>,
{
    /// Connections are opened lazily, on first use.
    pub fn build(manager: M, settings: PoolSettings, backend: &'static str) -> Self {
        let closing = Arc::new(AtomicBool::new(false));
        let pool = Pool::builder()
            .max_size(settings.max_size)
            .min_idle(None)
            .connection_timeout(settings.acquire_timeout)
            .retry_connection(false)
            .error_sink(Box::new(PoolErrorLogger {
                backend,
                closing: Arc::clone(&closing),
            }))
            .build_unchecked(manager);
        tracing::info!(backend, max_size = settings.max_size, "Connection pool created");
        Self { pool, closing }
    }

    /// Check out a connection, waiting for one to free up if the pool is saturated.
    pub async fn get(&self) -> Result<PooledConnection<'_, M>, DatabaseError> {
        if self.is_closing() {
            return Err(DatabaseError::PoolClosed);
        }
        Ok(self.pool.get().await?)
    }

    /// A connection outside the pool, with connection errors reported directly.
    pub async fn dedicated(&self) -> Result<M::Connection, DatabaseError> {
        Ok(self.pool.dedicated_connection().await?)
    }

    /// Silence the error sink; idle connections go away when the pool is dropped.
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    pub fn state(&self) -> bb8::State {
        self.pool.state()
    }
}

impl<M: ManageConnection> Drop for ManagedPool<M> {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::Release);
    }
}

/// Current credentials and the driver built from them.
///
/// Rotation replaces both at once. Callers that already hold the old driver
/// keep using it until they drop their handle.
pub struct DriverSlot<D> {
    state: RwLock<SlotState<D>>,
}

struct SlotState<D> {
    config: AuthConfig,
    driver: Option<Arc<D>>,
}

impl<D> DriverSlot<D> {
    pub fn new(config: AuthConfig, driver: D) -> Self {
        Self {
            state: RwLock::new(SlotState {
                config,
                driver: Some(Arc::new(driver)),
            }),
        }
    }

    pub async fn driver(&self) -> Result<Arc<D>, DatabaseError> {
        self.state
            .read()
            .await
            .driver
            .as_ref()
            .map(Arc::clone)
            .ok_or(DatabaseError::PoolClosed)
    }

    pub async fn config(&self) -> AuthConfig {
        self.state.read().await.config.clone()
    }

    /// Install a new config and driver, returning the previous driver.
    pub async fn replace(&self, config: AuthConfig, driver: D) -> Option<Arc<D>> {
        let mut state = self.state.write().await;
        state.config = config;
        state.driver.replace(Arc::new(driver))
    }

    /// Remove the driver. Later calls to [`DriverSlot::driver`] fail with `PoolClosed`.
    pub async fn take(&self) -> Option<Arc<D>> {
        self.state.write().await.driver.take()
    }
}
