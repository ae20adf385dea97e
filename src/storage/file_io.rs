//! File I/O utilities with atomic writes
//!
//! Provides safe file operations that won't corrupt data on failure. Writes go
//! to a temp file in the same directory, are synced, then renamed into place.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::TraekyError;

/// Read JSON from a file, returning `None` if the file doesn't exist
pub fn read_json<T, P>(path: P) -> Result<Option<T>, TraekyError>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();

    if !path.exists() {
        return Ok(None);
    }

    let file = File::open(path)
        .map_err(|e| TraekyError::Storage(format!("Failed to open {}: {}", path.display(), e)))?;

    let reader = BufReader::new(file);
    serde_json::from_reader(reader)
        .map(Some)
        .map_err(|e| TraekyError::Storage(format!("Failed to parse {}: {}", path.display(), e)))
}

/// Write JSON to a file atomically
pub fn write_json_atomic<T, P>(path: P, data: &T) -> Result<(), TraekyError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let bytes = serde_json::to_vec(data)
        .map_err(|e| TraekyError::Storage(format!("Failed to serialize data: {}", e)))?;

    write_bytes_atomic(path, &bytes).map_err(|e| {
        TraekyError::Storage(format!("Failed to write {}: {}", path.display(), e))
    })
}

/// Write raw bytes atomically (write to temp, sync, then rename)
///
/// Returns the raw `io::Error` so callers can tell permission problems from
/// other failures.
pub fn write_bytes_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid file name"))?;
    let temp_path = path.with_file_name(format!("{}.tmp", file_name));

    let mut file = File::create(&temp_path)?;
    file.write_all(data)?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    rename_with_fallback(&temp_path, path)
}

/// Rename, removing the destination first on platforms that refuse to overwrite
fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if fs::rename(temp_path, destination).is_err() {
        let _ = fs::remove_file(destination);
        fs::rename(temp_path, destination).map_err(|e| {
            let _ = fs::remove_file(temp_path);
            e
        })?;
    }
    Ok(())
}
