use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("storage quota exceeded: {needed} bytes needed, {limit} allowed")]
    QuotaExceeded { needed: usize, limit: usize },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// String key-value persistence with browser local-storage semantics.
///
/// A single `set` replaces the whole value; readers never observe a partial
/// write.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::QuotaExceeded` if the backend is full, or other storage errors.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`. Deleting a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be written.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Move the value under `from` to `to`. An existing `to` is never replaced.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if `from` is missing,
    /// `StorageError::Conflict` if `to` already holds a value, or other storage errors.
    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError>;

    /// List every stored key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backend cannot be read.
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryState {
    fn used_without(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

/// In-memory store for tests and prototyping.
///
/// An optional byte quota (keys plus values) makes quota-exceeded failures
/// reproducible.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_quota(bytes: usize) -> Self {
        let store = Self::new();
        store.set_quota(Some(bytes));
        store
    }

    /// Change the quota; `None` removes the limit. Existing entries are kept.
    pub fn set_quota(&self, bytes: Option<usize>) {
        if let Ok(mut guard) = self.state.lock() {
            guard.quota = bytes;
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if let Some(limit) = guard.quota {
            let needed = guard.used_without(key) + key.len() + value.len();
            if needed > limit {
                return Err(StorageError::QuotaExceeded { needed, limit });
            }
        }
        guard.entries.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.entries.remove(key);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.entries.contains_key(from) {
            return Err(StorageError::NotFound);
        }
        if guard.entries.contains_key(to) {
            return Err(StorageError::Conflict);
        }
        let value = guard.entries.remove(from).ok_or(StorageError::NotFound)?;
        guard.entries.insert(to.to_owned(), value);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let guard = self.lock()?;
        let mut keys: Vec<String> = guard.entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Key-value backend behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_store(InMemoryStore::new())
    }

    #[must_use]
    pub fn from_store(store: impl KeyValueStore + 'static) -> Self {
        let kv: Arc<dyn KeyValueStore> = Arc::new(store);
        Self { kv }
    }
}
