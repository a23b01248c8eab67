//! Durable key/value storage for service snapshots.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::ServiceError;
use crate::message::ServiceType;

/// Storage key of a service's persisted snapshot.
#[must_use]
pub fn persistence_key(identity: ServiceType) -> String {
    format!("persisted/{identity}")
}

/// Byte-oriented persistence backend.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn save(&self, key: &str, value: Vec<u8>) -> Result<(), ServiceError>;
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Volatile store for tests and single-run deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn save(&self, key: &str, value: Vec<u8>) -> Result<(), ServiceError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// Store keeping one JSON file per key under a root directory.
///
/// Key `persisted/sonar` maps to `<root>/persisted/sonar.json`. Writes go to a
/// temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Creates a store rooted at `root`. The directory is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, ServiceError> {
        if key.is_empty()
            || key
                .split('/')
                .any(|part| part.is_empty() || part == "." || part == "..")
        {
            return Err(ServiceError::Persistence {
                reason: format!("invalid storage key {key:?}"),
                source: None,
            });
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}

#[async_trait]
impl DurableStore for FileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, ServiceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn save(&self, key: &str, value: Vec<u8>) -> Result<(), ServiceError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, value).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}
