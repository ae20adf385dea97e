//! Durable key-value storage beneath the vault
//!
//! The [`KeyValueStore`] trait is the persistence substrate for the PIN-hash
//! index, the linked-file record, pending downloads and the whole-database
//! snapshot. Every other key found in a store is a candidate artifact of an
//! older storage layout and is only ever read, by the legacy migrator.

pub mod file_io;
pub mod file_store;
pub mod memory;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::{TraekyError, TraekyResult};

pub use file_io::{read_json, write_bytes_atomic, write_json_atomic};
pub use file_store::FileStore;
pub use memory::MemoryStore;

/// Keys written by the current storage scheme
pub mod keys {
    /// Whole database as a JSON document
    pub const DB_SNAPSHOT: &str = "traeky:db-snapshot";
    /// Profile id → PIN hash
    pub const PIN_INDEX: &str = "traeky:pin-index";
    /// Record of the linked portable database file
    pub const FILE_HANDLE: &str = "traeky:file-handle";
    /// CSV safety-net backups waiting to be delivered
    pub const PENDING_DOWNLOADS: &str = "traeky:pending-downloads";

    /// Whether a key belongs to the current scheme (and is not legacy data)
    pub fn is_current(key: &str) -> bool {
        matches!(key, DB_SNAPSHOT | PIN_INDEX | FILE_HANDLE | PENDING_DOWNLOADS)
    }
}

/// One key and its stored value
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEntry {
    pub key: String,
    pub value: Value,
}

/// Asynchronous durable key-value storage
///
/// Implementations surface [`TraekyError::StoreUnavailable`] when the backing
/// engine cannot be opened; callers decide whether that is fatal.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> TraekyResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> TraekyResult<()>;

    async fn delete(&self, key: &str) -> TraekyResult<()>;

    /// Every entry, ordered by key
    async fn list_all(&self) -> TraekyResult<Vec<StoreEntry>>;
}

/// Read and deserialize a typed value
pub async fn get_typed<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> TraekyResult<Option<T>> {
    match store.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| TraekyError::Storage(format!("Malformed value under {}: {}", key, e))),
        None => Ok(None),
    }
}

/// Serialize and write a typed value
pub async fn set_typed<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> TraekyResult<()> {
    let value = serde_json::to_value(value)?;
    store.set(key, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_current_keys() {
        assert!(keys::is_current(keys::DB_SNAPSHOT));
        assert!(keys::is_current(keys::PIN_INDEX));
        assert!(!keys::is_current("traeky:profiles:index"));
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let store = MemoryStore::new();
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), "hash".to_string());

        set_typed(&store, keys::PIN_INDEX, &map).await.unwrap();
        let back: Option<BTreeMap<String, String>> =
            get_typed(&store, keys::PIN_INDEX).await.unwrap();

        assert_eq!(back, Some(map));
    }

    #[tokio::test]
    async fn test_typed_malformed_value() {
        let store = MemoryStore::new();
        store
            .set(keys::PIN_INDEX, serde_json::json!([1, 2]))
            .await
            .unwrap();

        let result: TraekyResult<Option<BTreeMap<String, String>>> =
            get_typed(&store, keys::PIN_INDEX).await;
        assert!(matches!(result, Err(TraekyError::Storage(_))));
    }
}
