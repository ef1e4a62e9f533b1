use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use crate::store::{DEFAULT_NAMESPACE, StatusStore, StoreKey, StoreValue};

/// In-memory status store.
/// Clones share the same map, which stands in for a store shared by both
/// surfaces of one process. Nothing survives a restart.
#[derive(Clone)]
pub struct MemoryStore {
    namespace: Arc<str>,
    values: Arc<Mutex<HashMap<String, StoreValue>>>,
}

/// Error type for MemoryStore
#[derive(Debug)]
pub enum MemoryStoreError {
    MutexPoisoned(String),
}

impl std::error::Error for MemoryStoreError {}

impl fmt::Display for MemoryStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryStoreError::MutexPoisoned(msg) => write!(f, "Mutex poisoned: {}", msg),
        }
    }
}

impl<T> From<PoisonError<T>> for MemoryStoreError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryStoreError::MutexPoisoned(err.to_string())
    }
}

impl MemoryStore {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: Arc::from(namespace),
            values: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Raw keys currently held, sorted. Mostly useful in tests.
    pub fn keys(&self) -> Result<Vec<String>, MemoryStoreError> {
        let map = self.values.lock()?;
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

#[async_trait]
impl StatusStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn get(&self, key: StoreKey) -> Result<Option<StoreValue>, Self::Error> {
        let map = self.values.lock()?;
        Ok(map.get(&key.qualified(&self.namespace)).cloned())
    }

    async fn set(&self, key: StoreKey, value: StoreValue) -> Result<(), Self::Error> {
        let mut map = self.values.lock()?;
        map.insert(key.qualified(&self.namespace), value);
        Ok(())
    }
}
