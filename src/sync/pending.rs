//! Files waiting to be handed to the user
//!
//! CSV safety-net backups are queued in the store and written to the
//! downloads directory after the next successful sync.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{TraekyError, TraekyResult};
use crate::storage::{get_typed, keys, set_typed, write_bytes_atomic, KeyValueStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDownload {
    pub file_name: String,
    pub content: String,
}

pub async fn pending_downloads(store: &dyn KeyValueStore) -> TraekyResult<Vec<PendingDownload>> {
    Ok(get_typed(store, keys::PENDING_DOWNLOADS)
        .await?
        .unwrap_or_default())
}

/// Append to the queue, skipping an identical entry already queued
pub async fn queue_download(store: &dyn KeyValueStore, item: PendingDownload) -> TraekyResult<()> {
    let mut queue = pending_downloads(store).await?;
    if !queue.contains(&item) {
        queue.push(item);
    }
    set_typed(store, keys::PENDING_DOWNLOADS, &queue).await
}

/// Write every queued file into `dir` and clear the queue
pub async fn deliver_downloads(store: &dyn KeyValueStore, dir: &Path) -> TraekyResult<Vec<PathBuf>> {
    let queue = pending_downloads(store).await?;
    if queue.is_empty() {
        return Ok(Vec::new());
    }

    let mut delivered = Vec::with_capacity(queue.len());
    for item in &queue {
        let path = unique_path(dir, &item.file_name);
        write_bytes_atomic(&path, item.content.as_bytes()).map_err(|e| {
            TraekyError::Io(format!("Failed to write {}: {}", path.display(), e))
        })?;
        delivered.push(path);
    }
    store.delete(keys::PENDING_DOWNLOADS).await?;

    tracing::info!(target: "traeky", event = "backups_delivered", count = delivered.len());
    Ok(delivered)
}

/// `dir/name`, or `dir/stem-1.ext`, `dir/stem-2.ext`, ... if taken
pub fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let name = Path::new(file_name);
    let stem = name
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);
    let extension = name.extension().and_then(|e| e.to_str());

    (1u32..)
        .map(|n| match extension {
            Some(ext) => dir.join(format!("{}-{}.{}", stem, n, ext)),
            None => dir.join(format!("{}-{}", stem, n)),
        })
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}
