//! Per-certificate locking.
//!
//! Every balance mutation is serialized per certificate id, never globally:
//! operations on different certificates proceed fully in parallel. The
//! "check remaining, then decrement" sequence happens entirely inside one
//! acquired lock, so it cannot race.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use gridcert_core::CertificateId;

use crate::error::{EngineError, Result};

/// A map of per-certificate async mutexes with bounded acquisition.
pub struct LockMap {
    timeout: Duration,
    inner: StdMutex<HashMap<CertificateId, Arc<AsyncMutex<()>>>>,
}

impl LockMap {
    /// Create a lock map with the given acquisition timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            inner: StdMutex::new(HashMap::new()),
        }
    }

    fn handle(&self, id: CertificateId) -> Arc<AsyncMutex<()>> {
        let mut map = self.inner.lock().expect("lock map poisoned");
        Arc::clone(map.entry(id).or_default())
    }

    /// Acquire the exclusive critical section for one certificate.
    ///
    /// Fails with the retryable lock-timeout error instead of waiting
    /// unboundedly; a timed-out request has applied nothing.
    pub async fn acquire(&self, id: CertificateId) -> Result<OwnedMutexGuard<()>> {
        let handle = self.handle(id);
        tokio::time::timeout(self.timeout, handle.lock_owned())
            .await
            .map_err(|_| EngineError::LockTimeout(id))
    }
}
