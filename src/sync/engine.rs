//! Sync engine: startup load, debounced auto-save and file commands
//!
//! Lifecycle is `Uninitialized → Initializing → Ready`. Initialization picks
//! the starting database from the linked file, the local snapshot, or a new
//! empty database. Afterwards every change to the shared database schedules
//! a debounced write; `sync_now` writes immediately.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{DbFileFormat, DEFAULT_DB_FILE_NAME};
use crate::dbfile;
use crate::error::{TraekyError, TraekyResult};
use crate::models::VaultDatabase;
use crate::storage::{get_typed, keys, set_typed, write_bytes_atomic, KeyValueStore};
use crate::vault::SharedDatabase;

use super::merge::{merge_imported_db, MergeOutcome};
use super::pending::{deliver_downloads, unique_path};
use super::picker::FilePicker;

/// Engine lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    Initializing,
    Ready,
}

/// Where the starting database came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitSource {
    LinkedFile(PathBuf),
    Snapshot,
    Empty,
}

/// How a manual sync ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Written to the linked (or just picked) file
    WrittenToFile(PathBuf),
    /// No file available; bytes saved into the downloads directory
    Downloaded(PathBuf),
    /// The user dismissed the save dialog
    Cancelled,
}

/// Result of [`SyncEngine::sync_now`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub outcome: SyncOutcome,
    /// Safety-net backups handed over during this sync
    pub delivered_backups: Vec<PathBuf>,
}

/// What the UI shows about persistence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSyncStatus {
    pub is_ready: bool,
    pub is_dirty: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub file_label: Option<String>,
    pub conflicts: u32,
    pub db_revision: u64,
    pub is_initializing: bool,
}

/// Persisted record of the linked database file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedFile {
    pub path: PathBuf,
    pub label: String,
}

impl LinkedFile {
    fn new(path: &Path) -> Self {
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path: path.to_path_buf(),
            label,
        }
    }
}

/// Engine settings
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub downloads_dir: PathBuf,
    pub format: DbFileFormat,
    pub fallback_lang: String,
    pub debounce: Duration,
}

#[derive(Debug)]
struct EngineState {
    phase: SyncState,
    linked: Option<LinkedFile>,
    last_synced_revision: Option<u64>,
    last_synced_at: Option<DateTime<Utc>>,
    conflicts: u32,
}

struct Inner {
    store: Arc<dyn KeyValueStore>,
    shared: SharedDatabase,
    config: SyncConfig,
    picker: Option<Arc<dyn FilePicker>>,
    state: Mutex<EngineState>,
    write_lock: tokio::sync::Mutex<()>,
}

/// Keeps the shared database and its durable copies in step
pub struct SyncEngine {
    inner: Arc<Inner>,
    stop_tx: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        shared: SharedDatabase,
        config: SyncConfig,
        picker: Option<Arc<dyn FilePicker>>,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                shared,
                config,
                picker,
                state: Mutex::new(EngineState {
                    phase: SyncState::Uninitialized,
                    linked: None,
                    last_synced_revision: None,
                    last_synced_at: None,
                    conflicts: 0,
                }),
                write_lock: tokio::sync::Mutex::new(()),
            }),
            stop_tx,
            listener: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SyncState {
        lock(&self.inner.state).phase
    }

    /// Load the starting database and start auto-save
    ///
    /// Tries the linked file, then the snapshot, then starts empty. When both
    /// a file and a snapshot exist the higher revision wins; the file wins
    /// ties. A linked file that can no longer be accessed is unlinked.
    pub async fn initialize(&self) -> TraekyResult<InitSource> {
        {
            let mut state = lock(&self.inner.state);
            if state.phase != SyncState::Uninitialized {
                return Err(TraekyError::Validation(
                    "Sync engine already initialized".into(),
                ));
            }
            state.phase = SyncState::Initializing;
        }

        let inner = &self.inner;
        let from_file = match inner.restore_link().await {
            Some(link) => match inner.read_db_file(&link.path) {
                Ok(db) => Some((db, link)),
                Err(e @ TraekyError::FilePermission { .. }) => {
                    tracing::warn!(target: "traeky", event = "linked_file_lost", error = %e);
                    if let Err(e) = inner.store.delete(keys::FILE_HANDLE).await {
                        tracing::warn!(target: "traeky", event = "unlink_failed", error = %e);
                    }
                    None
                }
                Err(e) => {
                    tracing::warn!(target: "traeky", event = "linked_file_unreadable", error = %e);
                    None
                }
            },
            None => None,
        };
        let from_snapshot = inner.load_snapshot().await;

        let (db, source, linked, synced_revision) = match (from_file, from_snapshot) {
            (Some((file_db, link)), Some(snapshot)) if snapshot.revision() > file_db.revision() => {
                // The file is stale; leave it dirty so auto-save catches it up.
                let file_revision = file_db.revision();
                (snapshot, InitSource::Snapshot, Some(link), Some(file_revision))
            }
            (Some((file_db, link)), _) => {
                let revision = file_db.revision();
                let source = InitSource::LinkedFile(link.path.clone());
                (file_db, source, Some(link), Some(revision))
            }
            (None, Some(snapshot)) => {
                let revision = snapshot.revision();
                (snapshot, InitSource::Snapshot, None, Some(revision))
            }
            (None, None) => {
                let db = VaultDatabase::empty(&inner.config.fallback_lang);
                let revision = db.revision();
                (db, InitSource::Empty, None, Some(revision))
            }
        };

        inner.shared.replace(db);
        {
            let mut state = lock(&inner.state);
            state.linked = linked;
            state.last_synced_revision = synced_revision;
            state.phase = SyncState::Ready;
        }
        self.start_listener();

        tracing::info!(target: "traeky", event = "sync_ready", source = ?source);
        Ok(source)
    }

    fn start_listener(&self) {
        let inner = self.inner.clone();
        let changes = inner.shared.subscribe();
        let stop = self.stop_tx.subscribe();
        let handle = tokio::spawn(autosave_loop(inner, changes, stop));
        *lock(&self.listener) = Some(handle);
    }

    /// Stop auto-save and write anything still dirty
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);
        let handle = lock(&self.listener).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(target: "traeky", event = "autosave_task_panicked", error = %e);
            }
        }
        if self.inner.is_dirty() {
            if let Err(e) = self.inner.autosave().await {
                tracing::warn!(target: "traeky", event = "final_save_failed", error = %e);
            }
        }
    }

    pub fn status(&self) -> DbSyncStatus {
        let revision = self.inner.shared.revision();
        let state = lock(&self.inner.state);
        DbSyncStatus {
            is_ready: state.phase == SyncState::Ready,
            is_dirty: state.last_synced_revision != Some(revision),
            last_synced_at: state.last_synced_at,
            file_label: state.linked.as_ref().map(|l| l.label.clone()),
            conflicts: state.conflicts,
            db_revision: revision,
            is_initializing: state.phase == SyncState::Initializing,
        }
    }

    pub fn linked_file(&self) -> Option<LinkedFile> {
        lock(&self.inner.state).linked.clone()
    }

    /// Write now: linked file, else a picked file, else a download
    ///
    /// Pending safety-net backups are delivered after any successful write.
    pub async fn sync_now(&self) -> TraekyResult<SyncReport> {
        let inner = &self.inner;
        inner.require_ready()?;

        let mut outcome = None;
        if let Some(link) = inner.linked() {
            match inner.write_to_file(&link.path).await {
                Ok(()) => outcome = Some(SyncOutcome::WrittenToFile(link.path)),
                Err(e @ TraekyError::FilePermission { .. }) => {
                    tracing::warn!(target: "traeky", event = "linked_file_lost", error = %e);
                    inner.unlink().await;
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = match outcome {
            Some(outcome) => outcome,
            None => match &inner.picker {
                Some(picker) => match picker.pick_save_path(DEFAULT_DB_FILE_NAME).await {
                    Some(path) => {
                        inner.write_to_file(&path).await?;
                        inner.link(&path).await;
                        SyncOutcome::WrittenToFile(path)
                    }
                    None => {
                        tracing::debug!(target: "traeky", event = "save_dialog_dismissed");
                        return Ok(SyncReport {
                            outcome: SyncOutcome::Cancelled,
                            delivered_backups: Vec::new(),
                        });
                    }
                },
                None => SyncOutcome::Downloaded(inner.download().await?),
            },
        };

        let delivered_backups =
            match deliver_downloads(inner.store.as_ref(), &inner.config.downloads_dir).await {
                Ok(paths) => paths,
                Err(e) => {
                    tracing::warn!(target: "traeky", event = "backup_delivery_failed", error = %e);
                    Vec::new()
                }
            };

        Ok(SyncReport {
            outcome,
            delivered_backups,
        })
    }

    /// Pick a file and open it in place of the current database
    ///
    /// Returns `None` if the dialog was dismissed.
    pub async fn open_file(&self) -> TraekyResult<Option<PathBuf>> {
        let Some(path) = self.pick_open().await else {
            return Ok(None);
        };
        self.open_path(&path).await?;
        Ok(Some(path))
    }

    /// Replace the current database with a file's content and link to it
    pub async fn open_path(&self, path: &Path) -> TraekyResult<()> {
        let inner = &self.inner;
        inner.require_ready()?;
        let db = inner.read_db_file(path)?;
        let revision = db.revision();

        inner.shared.replace(db);
        inner.link(path).await;
        {
            let mut state = lock(&inner.state);
            state.last_synced_revision = Some(revision);
            state.last_synced_at = Some(Utc::now());
            state.conflicts = 0;
        }
        inner.save_snapshot_logged().await;

        tracing::info!(target: "traeky", event = "database_opened", path = %path.display(), revision);
        Ok(())
    }

    /// Pick a file and merge it into the current database
    pub async fn import_file(&self) -> TraekyResult<Option<MergeOutcome>> {
        let Some(path) = self.pick_open().await else {
            return Ok(None);
        };
        self.import_path(&path).await.map(Some)
    }

    /// Merge a file's content into the current database
    pub async fn import_path(&self, path: &Path) -> TraekyResult<MergeOutcome> {
        let inner = &self.inner;
        inner.require_ready()?;
        let imported = inner.read_db_file(path)?;

        let outcome = merge_imported_db(&inner.shared.snapshot(), &imported);
        inner.shared.replace(outcome.db.clone());
        lock(&inner.state).conflicts += outcome.conflicts;
        inner.save_snapshot_logged().await;

        tracing::info!(target: "traeky", event = "database_imported", path = %path.display());
        Ok(outcome)
    }

    /// Start over with an empty database, unlinking any file
    pub async fn create_new_database(&self) -> TraekyResult<()> {
        let inner = &self.inner;
        inner.require_ready()?;

        let db = VaultDatabase::empty(&inner.config.fallback_lang);
        inner.shared.replace(db);
        inner.unlink().await;
        lock(&inner.state).conflicts = 0;

        let _guard = inner.write_lock.lock().await;
        let db = inner.shared.snapshot();
        set_typed(inner.store.as_ref(), keys::DB_SNAPSHOT, &db).await?;
        inner.mark_synced(db.revision());

        tracing::info!(target: "traeky", event = "database_created");
        Ok(())
    }

    /// Write the current database to `path` and keep it linked
    pub async fn link_file(&self, path: &Path) -> TraekyResult<()> {
        let inner = &self.inner;
        inner.require_ready()?;
        inner.write_to_file(path).await?;
        inner.link(path).await;
        Ok(())
    }

    pub async fn unlink_file(&self) {
        self.inner.unlink().await;
    }

    async fn pick_open(&self) -> Option<PathBuf> {
        match &self.inner.picker {
            Some(picker) => picker.pick_open_path().await,
            None => None,
        }
    }
}

impl Inner {
    fn require_ready(&self) -> TraekyResult<()> {
        if lock(&self.state).phase != SyncState::Ready {
            return Err(TraekyError::Validation("Sync engine is not ready".into()));
        }
        Ok(())
    }

    fn linked(&self) -> Option<LinkedFile> {
        lock(&self.state).linked.clone()
    }

    fn is_dirty(&self) -> bool {
        lock(&self.state).last_synced_revision != Some(self.shared.revision())
    }

    fn mark_synced(&self, revision: u64) {
        let mut state = lock(&self.state);
        state.last_synced_revision = Some(revision);
        state.last_synced_at = Some(Utc::now());
    }

    async fn restore_link(&self) -> Option<LinkedFile> {
        match get_typed(self.store.as_ref(), keys::FILE_HANDLE).await {
            Ok(link) => link,
            Err(e) => {
                tracing::warn!(target: "traeky", event = "file_handle_unreadable", error = %e);
                None
            }
        }
    }

    async fn load_snapshot(&self) -> Option<VaultDatabase> {
        let value = match self.store.get(keys::DB_SNAPSHOT).await {
            Ok(value) => value?,
            Err(e) => {
                tracing::warn!(target: "traeky", event = "snapshot_unreadable", error = %e);
                return None;
            }
        };
        let parsed = serde_json::to_vec(&value)
            .map_err(TraekyError::from)
            .and_then(|bytes| dbfile::deserialize(&bytes, &self.config.fallback_lang));
        match parsed {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!(target: "traeky", event = "snapshot_invalid", error = %e);
                None
            }
        }
    }

    fn read_db_file(&self, path: &Path) -> TraekyResult<VaultDatabase> {
        let bytes = std::fs::read(path).map_err(|e| file_error(path, e))?;
        dbfile::deserialize(&bytes, &self.config.fallback_lang)
    }

    async fn link(&self, path: &Path) {
        let link = LinkedFile::new(path);
        if let Err(e) = set_typed(self.store.as_ref(), keys::FILE_HANDLE, &link).await {
            tracing::warn!(target: "traeky", event = "link_persist_failed", error = %e);
        }
        lock(&self.state).linked = Some(link);
    }

    async fn unlink(&self) {
        lock(&self.state).linked = None;
        if let Err(e) = self.store.delete(keys::FILE_HANDLE).await {
            tracing::warn!(target: "traeky", event = "unlink_failed", error = %e);
        }
    }

    async fn save_snapshot_logged(&self) {
        let _guard = self.write_lock.lock().await;
        let db = self.shared.snapshot();
        if let Err(e) = set_typed(self.store.as_ref(), keys::DB_SNAPSHOT, &db).await {
            tracing::warn!(target: "traeky", event = "snapshot_failed", error = %e);
        }
    }

    /// Serialize the current state to `path`, also refreshing the snapshot
    async fn write_to_file(&self, path: &Path) -> TraekyResult<()> {
        let _guard = self.write_lock.lock().await;
        let db = self.shared.snapshot();
        let bytes = dbfile::serialize(&db, self.config.format)?;

        let target = path.to_path_buf();
        tokio::task::spawn_blocking(move || write_bytes_atomic(&target, &bytes))
            .await
            .map_err(|e| TraekyError::Io(format!("Write task failed: {}", e)))?
            .map_err(|e| file_error(path, e))?;

        if let Err(e) = set_typed(self.store.as_ref(), keys::DB_SNAPSHOT, &db).await {
            tracing::warn!(target: "traeky", event = "snapshot_failed", error = %e);
        }
        self.mark_synced(db.revision());
        tracing::debug!(target: "traeky", event = "file_written", path = %path.display(), revision = db.revision());
        Ok(())
    }

    /// Save the serialized database into the downloads directory
    async fn download(&self) -> TraekyResult<PathBuf> {
        let path = unique_path(&self.config.downloads_dir, DEFAULT_DB_FILE_NAME);
        self.write_to_file(&path).await?;
        tracing::info!(target: "traeky", event = "database_downloaded", path = %path.display());
        Ok(path)
    }

    /// Debounced write: linked file if any, else the snapshot only
    async fn autosave(&self) -> TraekyResult<()> {
        if let Some(link) = self.linked() {
            match self.write_to_file(&link.path).await {
                Ok(()) => return Ok(()),
                Err(e @ TraekyError::FilePermission { .. }) => {
                    tracing::warn!(target: "traeky", event = "linked_file_lost", error = %e);
                    self.unlink().await;
                }
                Err(e) => return Err(e),
            }
        }

        let _guard = self.write_lock.lock().await;
        let db = self.shared.snapshot();
        set_typed(self.store.as_ref(), keys::DB_SNAPSHOT, &db).await?;
        self.mark_synced(db.revision());
        Ok(())
    }
}

fn file_error(path: &Path, e: io::Error) -> TraekyError {
    match e.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound => TraekyError::FilePermission {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
        _ => TraekyError::Io(format!("{}: {}", path.display(), e)),
    }
}

/// Wait for a change, let the burst settle, then write once
async fn autosave_loop(
    inner: Arc<Inner>,
    mut changes: watch::Receiver<u64>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = changes.changed() => if changed.is_err() { return },
            _ = stop.changed() => return,
        }

        loop {
            tokio::select! {
                changed = changes.changed() => if changed.is_err() { return },
                _ = tokio::time::sleep(inner.config.debounce) => break,
                _ = stop.changed() => return,
            }
        }

        if inner.is_dirty() {
            if let Err(e) = inner.autosave().await {
                tracing::warn!(target: "traeky", event = "autosave_failed", error = %e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::storage::MemoryStore;
    use crate::sync::picker::StaticPicker;
    use tempfile::TempDir;

    fn config(dir: &Path) -> SyncConfig {
        SyncConfig {
            downloads_dir: dir.join("downloads"),
            format: DbFileFormat::Sqlite,
            fallback_lang: "en".into(),
            debounce: Duration::from_millis(1000),
        }
    }

    fn engine_with(
        store: Arc<MemoryStore>,
        dir: &Path,
        picker: Option<Arc<dyn FilePicker>>,
    ) -> (SyncEngine, SharedDatabase) {
        let shared = SharedDatabase::default();
        let engine = SyncEngine::new(store, shared.clone(), config(dir), picker);
        (engine, shared)
    }

    fn write_db_file(path: &Path, revision: u64, name: &str) {
        let mut db = VaultDatabase::empty("en");
        db.index.upsert(Profile::new(name));
        db.meta.revision = revision;
        std::fs::write(path, dbfile::serialize(&db, DbFileFormat::Sqlite).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_initialize_empty() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, shared) = engine_with(Arc::new(MemoryStore::new()), temp_dir.path(), None);
        assert_eq!(engine.state(), SyncState::Uninitialized);

        assert_eq!(engine.initialize().await.unwrap(), InitSource::Empty);
        let status = engine.status();
        assert!(status.is_ready && !status.is_dirty && !status.is_initializing);
        assert_eq!(shared.revision(), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_initialize_prefers_newer_of_file_and_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("traeky.db");
        write_db_file(&file, 5, "FromFile");

        let store = Arc::new(MemoryStore::new());
        set_typed(store.as_ref(), keys::FILE_HANDLE, &LinkedFile::new(&file))
            .await
            .unwrap();
        let mut snapshot = VaultDatabase::empty("en");
        snapshot.index.upsert(Profile::new("FromSnapshot"));
        snapshot.meta.revision = 5;
        set_typed(store.as_ref(), keys::DB_SNAPSHOT, &snapshot).await.unwrap();

        let (engine, shared) = engine_with(store.clone(), temp_dir.path(), None);
        assert_eq!(engine.initialize().await.unwrap(), InitSource::LinkedFile(file.clone()));
        assert_eq!(shared.read(|db| db.profiles()[0].name.clone()), "FromFile");
        engine.shutdown().await;

        snapshot.meta.revision = 6;
        set_typed(store.as_ref(), keys::DB_SNAPSHOT, &snapshot).await.unwrap();
        let (engine, shared) = engine_with(store, temp_dir.path(), None);
        assert_eq!(engine.initialize().await.unwrap(), InitSource::Snapshot);
        assert_eq!(shared.read(|db| db.profiles()[0].name.clone()), "FromSnapshot");
        assert!(engine.status().is_dirty);
        assert_eq!(engine.status().file_label.as_deref(), Some("traeky.db"));
    }

    #[tokio::test]
    async fn test_missing_linked_file_is_unlinked() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let gone = temp_dir.path().join("gone.db");
        set_typed(store.as_ref(), keys::FILE_HANDLE, &LinkedFile::new(&gone))
            .await
            .unwrap();

        let (engine, _) = engine_with(store.clone(), temp_dir.path(), None);
        assert_eq!(engine.initialize().await.unwrap(), InitSource::Empty);
        assert!(engine.linked_file().is_none());
        assert!(store.get(keys::FILE_HANDLE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sync_now_without_picker_downloads() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, shared) = engine_with(Arc::new(MemoryStore::new()), temp_dir.path(), None);
        engine.initialize().await.unwrap();
        shared.mutate(|db| db.index.upsert(Profile::new("Alice")));

        let first = engine.sync_now().await.unwrap();
        let second = engine.sync_now().await.unwrap();

        let downloads = temp_dir.path().join("downloads");
        assert_eq!(first.outcome, SyncOutcome::Downloaded(downloads.join("traeky.db")));
        assert_eq!(second.outcome, SyncOutcome::Downloaded(downloads.join("traeky-1.db")));
        assert!(!engine.status().is_dirty);
    }

    #[tokio::test]
    async fn test_sync_now_cancelled_dialog() {
        let temp_dir = TempDir::new().unwrap();
        let picker: Arc<dyn FilePicker> = Arc::new(StaticPicker::cancelled());
        let (engine, shared) =
            engine_with(Arc::new(MemoryStore::new()), temp_dir.path(), Some(picker));
        engine.initialize().await.unwrap();
        shared.mutate(|_| ());

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::Cancelled);
        assert!(engine.status().is_dirty);
    }

    #[tokio::test]
    async fn test_sync_now_links_picked_file() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("mine.db");
        let picker: Arc<dyn FilePicker> = Arc::new(StaticPicker::new(&target));
        let (engine, _) = engine_with(Arc::new(MemoryStore::new()), temp_dir.path(), Some(picker));
        engine.initialize().await.unwrap();

        let report = engine.sync_now().await.unwrap();
        assert_eq!(report.outcome, SyncOutcome::WrittenToFile(target.clone()));
        assert_eq!(engine.linked_file().unwrap().path, target);
        assert!(std::fs::read(&target).unwrap().starts_with(dbfile::SQLITE_MAGIC));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_collapses_bursts() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let (engine, shared) = engine_with(store.clone(), temp_dir.path(), None);
        engine.initialize().await.unwrap();

        for _ in 0..5 {
            shared.mutate(|_| ());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(engine.status().is_dirty);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let status = engine.status();
        assert!(!status.is_dirty);
        assert_eq!(status.db_revision, 5);

        let saved: VaultDatabase = get_typed(store.as_ref(), keys::DB_SNAPSHOT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.revision(), 5);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_open_and_import() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("other.db");
        write_db_file(&file, 3, "Bob");

        let (engine, shared) = engine_with(Arc::new(MemoryStore::new()), temp_dir.path(), None);
        engine.initialize().await.unwrap();
        shared.mutate(|db| db.index.upsert(Profile::new("Alice")));

        let outcome = engine.import_path(&file).await.unwrap();
        assert_eq!(outcome.adopted.len(), 1);
        assert_eq!(shared.read(|db| db.profiles().len()), 2);
        assert!(engine.linked_file().is_none());

        engine.open_path(&file).await.unwrap();
        assert_eq!(shared.read(|db| db.profiles().len()), 1);
        assert_eq!(engine.linked_file().unwrap().path, file);
        assert!(!engine.status().is_dirty);

        let bogus = temp_dir.path().join("bogus.db");
        std::fs::write(&bogus, "not a database").unwrap();
        assert!(matches!(
            engine.open_path(&bogus).await,
            Err(TraekyError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_create_new_database() {
        let temp_dir = TempDir::new().unwrap();
        let (engine, shared) = engine_with(Arc::new(MemoryStore::new()), temp_dir.path(), None);
        engine.initialize().await.unwrap();
        engine.link_file(&temp_dir.path().join("a.db")).await.unwrap();
        shared.mutate(|db| db.index.upsert(Profile::new("Alice")));

        engine.create_new_database().await.unwrap();
        assert!(shared.read(|db| db.profiles().is_empty()));
        assert!(engine.linked_file().is_none());
        assert!(!engine.status().is_dirty);
    }
}
