//! Directory-backed key-value store
//!
//! Each key is stored as one JSON file whose name is the hex-encoded key, so
//! arbitrary legacy key strings map to safe file names. Keys too long for a
//! file name are stored under their SHA-256 digest instead, with the key kept
//! inside the file. Writes are atomic. Filesystem work runs on the blocking
//! pool to keep the async runtime free.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{TraekyError, TraekyResult};

use super::file_io::{read_json, write_json_atomic};
use super::{KeyValueStore, StoreEntry};

const ENTRY_EXTENSION: &str = "json";
const KEYED_EXTENSION: &str = "keyed";

/// Longest key whose hex encoding still fits a 255-byte file name
const MAX_PLAIN_KEY_LEN: usize = 120;

/// File contents for a key stored under its digest
#[derive(Debug, Serialize, Deserialize)]
struct KeyedEntry {
    key: String,
    value: Value,
}

/// [`KeyValueStore`] persisting one file per key under a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `dir`
    ///
    /// Fails with `StoreUnavailable` if the directory cannot be created or
    /// written to.
    pub fn open(dir: impl Into<PathBuf>) -> TraekyResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            TraekyError::StoreUnavailable(format!("{}: {}", dir.display(), e))
        })?;

        let probe = dir.join(".probe");
        fs::write(&probe, b"ok")
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|e| {
                TraekyError::StoreUnavailable(format!("{} is not writable: {}", dir.display(), e))
            })?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        if is_long(key) {
            let digest = hex::encode(Sha256::digest(key.as_bytes()));
            self.dir.join(format!("{}.{}", digest, KEYED_EXTENSION))
        } else {
            self.dir
                .join(format!("{}.{}", hex::encode(key.as_bytes()), ENTRY_EXTENSION))
        }
    }

    fn key_from_path(path: &Path) -> Option<String> {
        if path.extension()? != ENTRY_EXTENSION {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let bytes = hex::decode(stem).ok()?;
        String::from_utf8(bytes).ok()
    }
}

fn is_long(key: &str) -> bool {
    key.len() > MAX_PLAIN_KEY_LEN
}

fn is_keyed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == KEYED_EXTENSION)
}

async fn blocking<T, F>(f: F) -> TraekyResult<T>
where
    F: FnOnce() -> TraekyResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TraekyError::Storage(format!("Store task failed: {}", e)))?
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> TraekyResult<Option<Value>> {
        let path = self.entry_path(key);
        if !is_long(key) {
            return blocking(move || read_json(&path)).await;
        }
        let key = key.to_string();
        blocking(move || {
            let entry: Option<KeyedEntry> = read_json(&path)?;
            Ok(entry.filter(|e| e.key == key).map(|e| e.value))
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> TraekyResult<()> {
        let path = self.entry_path(key);
        if !is_long(key) {
            return blocking(move || write_json_atomic(&path, &value)).await;
        }
        let entry = KeyedEntry {
            key: key.to_string(),
            value,
        };
        blocking(move || write_json_atomic(&path, &entry)).await
    }

    async fn delete(&self, key: &str) -> TraekyResult<()> {
        let path = self.entry_path(key);
        blocking(move || match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(TraekyError::Storage(format!(
                "Failed to delete {}: {}",
                path.display(),
                e
            ))),
        })
        .await
    }

    async fn list_all(&self) -> TraekyResult<Vec<StoreEntry>> {
        let dir = self.dir.clone();
        blocking(move || {
            let read_dir = fs::read_dir(&dir).map_err(|e| {
                TraekyError::StoreUnavailable(format!("{}: {}", dir.display(), e))
            })?;

            let mut entries = Vec::new();
            for entry in read_dir {
                let path = entry
                    .map_err(|e| TraekyError::Storage(format!("Failed to read entry: {}", e)))?
                    .path();
                if is_keyed(&path) {
                    match read_json::<KeyedEntry, _>(&path) {
                        Ok(Some(entry)) => entries.push(StoreEntry {
                            key: entry.key,
                            value: entry.value,
                        }),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(target: "traeky", event = "store_entry_unreadable", path = %path.display(), error = %e)
                        }
                    }
                    continue;
                }
                let Some(key) = FileStore::key_from_path(&path) else {
                    continue;
                };
                // Unparseable files are skipped; they cannot be store entries.
                match read_json::<Value, _>(&path) {
                    Ok(Some(value)) => entries.push(StoreEntry { key, value }),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(target: "traeky", event = "store_entry_unreadable", key = %key, error = %e)
                    }
                }
            }
            entries.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(entries)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();

        let store = FileStore::open(temp_dir.path()).unwrap();
        store.set("traeky:pin-index", json!({"a": "h"})).await.unwrap();

        let reopened = FileStore::open(temp_dir.path()).unwrap();
        assert_eq!(
            reopened.get("traeky:pin-index").await.unwrap(),
            Some(json!({"a": "h"}))
        );
    }

    #[tokio::test]
    async fn test_list_all_decodes_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();

        store.set("traeky:profile:abc:data", json!(1)).await.unwrap();
        store.set("weird/key with spaces", json!(2)).await.unwrap();
        fs::write(temp_dir.path().join("README.txt"), "ignored").unwrap();

        let entries = store.list_all().await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["traeky:profile:abc:data", "weird/key with spaces"]);
    }

    #[tokio::test]
    async fn test_long_keys_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        let key = format!("traeky:profile:{}:data", "x".repeat(300));

        store.set(&key, json!({"n": 1})).await.unwrap();
        store.set("short", json!(2)).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(json!({"n": 1})));

        let entries = store.list_all().await.unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["short", key.as_str()]);

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::open(temp_dir.path()).unwrap();
        store.delete("nothing-here").await.unwrap();
    }

    #[test]
    fn test_unwritable_location_is_unavailable() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let result = FileStore::open(blocker.join("store"));
        assert!(matches!(result, Err(TraekyError::StoreUnavailable(_))));
    }
}
