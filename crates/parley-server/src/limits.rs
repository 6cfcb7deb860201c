//! Cap on concurrent WebSocket connections.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Hands out one permit per open connection, up to a fixed maximum.
#[derive(Debug)]
pub struct ConnectionLimiter {
    permits: Arc<Semaphore>,
    max: usize,
}

impl ConnectionLimiter {
    /// Allow up to `max` concurrent connections.
    pub fn new(max: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max)),
            max,
        }
    }

    /// Take a slot, or `None` when the server is full. The slot is released
    /// when the permit drops.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().ok()
    }

    /// Connections currently holding a permit.
    pub fn active(&self) -> usize {
        self.max.saturating_sub(self.permits.available_permits())
    }

    /// Configured maximum.
    pub fn max(&self) -> usize {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_are_capped_and_released() {
        let limiter = ConnectionLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert_eq!(limiter.active(), 2);
        assert!(limiter.try_acquire().is_none());
        drop(a);
        assert_eq!(limiter.active(), 1);
        assert!(limiter.try_acquire().is_some());
    }
}
