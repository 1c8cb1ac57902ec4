use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Bounds how many connections are served at once. A connection task holds
/// its permit until it finishes.
#[derive(Clone)]
pub struct ConnectionLimiter {
    max_connections: Arc<Semaphore>,
    limit: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Self {
        debug_assert!(max_connections > 0, "Precondition: need at least one connection slot");
        ConnectionLimiter {
            max_connections: Arc::new(Semaphore::new(max_connections)),
            limit: max_connections,
        }
    }

    /// Wait for a free slot
    pub async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.max_connections.clone().acquire_owned().await
    }

    pub fn available(&self) -> usize {
        self.max_connections.available_permits()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for ConnectionLimiter {
    fn default() -> Self {
        Self::new(super::DEFAULT_MAX_CONNECTIONS)
    }
}
