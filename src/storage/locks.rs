//! Per-key lock coordination.
//!
//! Every key gets its own async mutex the first time it is mutated. The map of
//! mutexes is a `DashMap`, so lazily inserting the lock for one key never
//! blocks callers working on other keys. Locks are kept for the lifetime of
//! the process.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

use super::error::StoreError;

#[derive(Default)]
pub struct KeyLockCoordinator {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyLockCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock of `key`, then runs `action` while holding it.
    ///
    /// `action` is synchronous: once the lock is held the mutation runs to
    /// completion, so cancellation can only take effect while waiting.
    pub async fn run_exclusive<T>(
        &self,
        key: &str,
        operation: &str,
        cancel: &CancellationToken,
        action: impl FnOnce() -> T,
    ) -> Result<T, StoreError> {
        let _guard = self.acquire(key, operation, cancel).await?;

        tracing::debug!("{} starting for key '{}'", operation, key);
        let result = action();
        tracing::debug!("{} completed for key '{}'", operation, key);

        Ok(result)
    }

    /// Waits for the lock of `key` and hands out its guard. Waiters are
    /// served in arrival order.
    pub async fn acquire(
        &self,
        key: &str,
        operation: &str,
        cancel: &CancellationToken,
    ) -> Result<OwnedMutexGuard<()>, StoreError> {
        tracing::debug!("{} requested for key '{}'", operation, key);

        let lock = self.lock_for(key);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!("{} for key '{}' cancelled while waiting for lock", operation, key);
                Err(StoreError::Cancelled)
            }
            guard = lock.lock_owned() => Ok(guard),
        }
    }

    /// Number of keys that have ever been locked.
    pub fn tracked_keys(&self) -> usize {
        self.locks.len()
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.locks.get(key) {
            return Arc::clone(lock.value());
        }
        Arc::clone(self.locks.entry(key.to_string()).or_default().value())
    }
}
