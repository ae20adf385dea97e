//! In-memory key-value store
//!
//! Used by tests and as a volatile fallback when no durable store can be
//! opened. Can be built in an "unavailable" state to exercise error paths.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{TraekyError, TraekyResult};

use super::{KeyValueStore, StoreEntry};

/// Volatile [`KeyValueStore`] backed by a sorted map
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, Value>>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate with entries, e.g. legacy fixtures
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let data = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            data: RwLock::new(data),
            unavailable: false,
        }
    }

    /// A store whose every operation fails with `StoreUnavailable`
    pub fn unavailable() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
            unavailable: true,
        }
    }

    fn check(&self) -> TraekyResult<()> {
        if self.unavailable {
            return Err(TraekyError::StoreUnavailable(
                "in-memory store disabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> TraekyResult<Option<Value>> {
        self.check()?;
        let data = self.data.read().map_err(|e| {
            TraekyError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> TraekyResult<()> {
        self.check()?;
        let mut data = self.data.write().map_err(|e| {
            TraekyError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        data.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> TraekyResult<()> {
        self.check()?;
        let mut data = self.data.write().map_err(|e| {
            TraekyError::Storage(format!("Failed to acquire write lock: {}", e))
        })?;
        data.remove(key);
        Ok(())
    }

    async fn list_all(&self) -> TraekyResult<Vec<StoreEntry>> {
        self.check()?;
        let data = self.data.read().map_err(|e| {
            TraekyError::Storage(format!("Failed to acquire read lock: {}", e))
        })?;
        Ok(data
            .iter()
            .map(|(key, value)| StoreEntry {
                key: key.clone(),
                value: value.clone(),
            })
            .collect())
    }
}
