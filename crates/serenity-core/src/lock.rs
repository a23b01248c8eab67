//! Named, timeout-bound locks.
//!
//! A [`LockRegistry`] hands out one mutex per name, so every caller asking
//! for the same name serializes on the same lock. Acquisition waits at most
//! the registry's timeout and fails with [`ServiceError::LockTimeout`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::ServiceError;
use crate::message::ServiceType;

/// Lock name used for a service identity.
#[must_use]
pub fn lock_key(identity: ServiceType) -> String {
    format!("lock/{identity}")
}

/// Shared table of named locks.
#[derive(Debug, Clone)]
pub struct LockRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl LockRegistry {
    /// Creates an empty registry whose locks time out after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }

    /// Returns the lock named `name`, creating it on first use.
    #[must_use]
    pub fn get(&self, name: &str) -> NamedLock {
        let mutex = self
            .locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        NamedLock {
            name: Arc::from(name),
            mutex,
            timeout: self.timeout,
        }
    }
}

/// Handle on one named lock. Clones share the same mutex.
#[derive(Debug, Clone)]
pub struct NamedLock {
    name: Arc<str>,
    mutex: Arc<Mutex<()>>,
    timeout: Duration,
}

impl NamedLock {
    /// Lock name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for the lock, at most for the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::LockTimeout`] if the lock is still held when the
    /// timeout expires.
    pub async fn acquire(&self) -> Result<NamedLockGuard, ServiceError> {
        match tokio::time::timeout(self.timeout, Arc::clone(&self.mutex).lock_owned()).await {
            Ok(guard) => Ok(NamedLockGuard { _guard: guard }),
            Err(_) => Err(ServiceError::LockTimeout {
                name: self.name.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    /// Returns true if both handles refer to the same mutex.
    #[must_use]
    pub fn same_lock(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.mutex, &other.mutex)
    }
}

/// Held lock. Released on drop.
#[derive(Debug)]
pub struct NamedLockGuard {
    _guard: OwnedMutexGuard<()>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_name_yields_same_lock() {
        let registry = LockRegistry::new(Duration::from_millis(50));
        let a = registry.get(&lock_key(ServiceType::Sonar));
        let b = registry.get("lock/sonar");
        let c = registry.get(&lock_key(ServiceType::Light));
        assert!(a.same_lock(&b));
        assert!(!a.same_lock(&c));
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let registry = LockRegistry::new(Duration::from_millis(20));
        let lock = registry.get("lock/sonar");
        let _held = lock.acquire().await.unwrap();

        let err = registry.get("lock/sonar").acquire().await.unwrap_err();
        assert!(matches!(err, ServiceError::LockTimeout { ref name, .. } if name == "lock/sonar"));
    }

    #[tokio::test]
    async fn released_lock_can_be_reacquired() {
        let registry = LockRegistry::new(Duration::from_millis(20));
        let lock = registry.get("lock/switch");
        drop(lock.acquire().await.unwrap());
        assert!(lock.acquire().await.is_ok());
    }
}
