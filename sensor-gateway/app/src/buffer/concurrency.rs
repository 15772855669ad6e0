// Poison-tolerant mutex for state shared between ingestion and the uploader.
// A poisoned lock is recovered instead of propagated.

use std::sync::{Mutex, MutexGuard};

pub struct RobustMutex<T> {
    inner: Mutex<T>,
    operation_name: &'static str,
}

impl<T> RobustMutex<T> {
    pub fn new(data: T, operation_name: &'static str) -> Self {
        Self {
            inner: Mutex::new(data),
            operation_name,
        }
    }

    /// Blocking lock acquisition with automatic recovery from a poisoned state
    pub fn lock_safe(&self) -> MutexGuard<'_, T> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::error!(
                    operation = self.operation_name,
                    "Mutex poisoned, attempting automatic recovery"
                );
                self.inner.clear_poison();
                poisoned.into_inner()
            }
        }
    }
}

impl<T> std::fmt::Debug for RobustMutex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RobustMutex")
            .field("operation_name", &self.operation_name)
            .finish_non_exhaustive()
    }
}
