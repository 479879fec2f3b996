//! Connection admission with bounded concurrency

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::MAX_CONNECTIONS;
use crate::{Result, VcrError};

/// Limits the number of connections a proxy server serves at once
#[derive(Clone)]
pub struct ConnectionPool {
    semaphore: Arc<Semaphore>,
    active_count: Arc<AtomicUsize>,
    max_connections: usize,
}

impl ConnectionPool {
    /// Create a pool admitting up to `max_connections` (at least one)
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);

        Self {
            semaphore: Arc::new(Semaphore::new(max_connections)),
            active_count: Arc::new(AtomicUsize::new(0)),
            max_connections,
        }
    }

    /// Admit a connection if a slot is free
    pub fn try_acquire(&self) -> Option<ConnectionGuard> {
        let permit = Arc::clone(&self.semaphore).try_acquire_owned().ok()?;
        Some(self.guard(permit))
    }

    /// Admit a connection, waiting for a free slot
    ///
    /// # Errors
    ///
    /// Returns error if the pool was closed
    pub async fn acquire(&self) -> Result<ConnectionGuard> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| VcrError::Other("Connection pool closed".to_string()))?;

        Ok(self.guard(permit))
    }

    /// Stop admitting connections; pending `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }

    /// Number of connections currently admitted
    #[must_use]
    pub fn active_connections(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Configured maximum
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    fn guard(&self, permit: OwnedSemaphorePermit) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            _permit: permit,
            active_count: Arc::clone(&self.active_count),
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(MAX_CONNECTIONS)
    }
}

/// Releases a connection slot when dropped
pub struct ConnectionGuard {
    _permit: OwnedSemaphorePermit,
    active_count: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
    }
}
