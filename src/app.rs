//! Application wiring
//!
//! [`Traeky`] opens the store, loads the database through the sync engine,
//! runs the legacy migrator once and hands the result to the profile vault.
//! Commands that replace or merge the database go through here so the
//! active session is re-validated afterwards.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{LegacyCompatibilityConfig, Settings, TraekyPaths};
use crate::error::{TraekyError, TraekyResult};
use crate::migrate::{LegacyMigrator, MigrationReport};
use crate::models::VaultDatabase;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::sync::{
    FilePicker, InitSource, MergeOutcome, SyncConfig, SyncEngine, SyncReport,
};
use crate::vault::{ProfileVault, SharedDatabase};

/// A fully opened Traeky instance
pub struct Traeky {
    paths: TraekyPaths,
    settings: Settings,
    engine: SyncEngine,
    vault: ProfileVault,
    init_source: InitSource,
    migration: MigrationReport,
    persistent: bool,
}

impl Traeky {
    /// Open using the on-disk store under `paths`
    ///
    /// If the store directory is unusable the instance runs on a volatile
    /// in-memory store; [`Traeky::is_persistent`] reports this.
    pub async fn open(
        paths: TraekyPaths,
        settings: Settings,
        legacy: LegacyCompatibilityConfig,
        picker: Option<Arc<dyn FilePicker>>,
    ) -> TraekyResult<Self> {
        if let Err(e) = paths.ensure_directories() {
            tracing::warn!(target: "traeky", event = "directories_unavailable", error = %e);
        }
        let (store, persistent): (Arc<dyn KeyValueStore>, bool) =
            match FileStore::open(paths.store_dir()) {
                Ok(store) => (Arc::new(store), true),
                Err(TraekyError::StoreUnavailable(reason)) => {
                    tracing::warn!(target: "traeky", event = "store_unavailable", reason = %reason);
                    (Arc::new(MemoryStore::new()), false)
                }
                Err(e) => return Err(e),
            };
        let mut app = Self::open_with_store(store, paths, settings, legacy, picker).await?;
        app.persistent = persistent;
        Ok(app)
    }

    /// Open on a given store
    pub async fn open_with_store(
        store: Arc<dyn KeyValueStore>,
        paths: TraekyPaths,
        settings: Settings,
        legacy: LegacyCompatibilityConfig,
        picker: Option<Arc<dyn FilePicker>>,
    ) -> TraekyResult<Self> {
        let shared = SharedDatabase::new(VaultDatabase::empty(settings.lang.as_str()));
        let config = SyncConfig {
            downloads_dir: paths.downloads_dir(),
            format: settings.db_format,
            fallback_lang: settings.lang.clone(),
            debounce: Duration::from_millis(settings.autosave_debounce_ms),
        };

        let engine = SyncEngine::new(store.clone(), shared.clone(), config, picker);
        let init_source = engine.initialize().await?;

        let migrator = LegacyMigrator::new(store.clone(), shared.clone(), legacy.clone());
        let outcome = match migrator.run_once().await {
            Ok(outcome) => outcome.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(target: "traeky", event = "migration_failed", error = %e);
                Default::default()
            }
        };

        let vault = ProfileVault::open(store, shared, legacy).await?;
        if let Some(seed) = outcome.seed {
            vault.set_legacy_seed(seed);
        }

        Ok(Self {
            paths,
            settings,
            engine,
            vault,
            init_source,
            migration: outcome.report,
            persistent: true,
        })
    }

    pub fn vault(&self) -> &ProfileVault {
        &self.vault
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn paths(&self) -> &TraekyPaths {
        &self.paths
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Where the starting database was loaded from
    pub fn init_source(&self) -> &InitSource {
        &self.init_source
    }

    pub fn migration_report(&self) -> &MigrationReport {
        &self.migration
    }

    /// False when running on the in-memory fallback store
    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Write now; pending persists of the session are awaited first
    pub async fn sync_now(&self) -> TraekyResult<SyncReport> {
        self.vault.flush().await;
        self.engine.sync_now().await
    }

    /// Replace the database with a file's content and link it
    pub async fn open_database_file(&self, path: &Path) -> TraekyResult<()> {
        self.vault.flush().await;
        self.engine.open_path(path).await?;
        self.vault.reload_session().await?;
        Ok(())
    }

    /// Merge a file's content into the current database
    pub async fn import_database_file(&self, path: &Path) -> TraekyResult<MergeOutcome> {
        self.vault.flush().await;
        let outcome = self.engine.import_path(path).await?;
        self.vault.reload_session().await?;
        Ok(outcome)
    }

    /// Start over with an empty database
    pub async fn create_new_database(&self) -> TraekyResult<()> {
        self.vault.flush().await;
        self.engine.create_new_database().await?;
        self.vault.reload_session().await?;
        Ok(())
    }

    /// Finish background work and write anything still dirty
    pub async fn shutdown(&self) {
        self.vault.flush().await;
        self.engine.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings() -> Settings {
        Settings {
            autosave_debounce_ms: 10,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn test_open_fresh_directory() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TraekyPaths::with_base_dir(temp_dir.path().to_path_buf());

        let app = Traeky::open(paths, settings(), LegacyCompatibilityConfig::default(), None)
            .await
            .unwrap();
        assert!(app.is_persistent());
        assert_eq!(app.init_source(), &InitSource::Empty);
        assert!(app.migration_report().is_empty());
        assert!(app.vault().list_profiles().is_empty());
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_seed_handed_to_vault() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TraekyPaths::with_base_dir(temp_dir.path().to_path_buf());
        let store = Arc::new(MemoryStore::with_entries([(
            "transactions",
            json!([{"id": 1, "asset_symbol": "BTC", "tx_type": "BUY", "amount": 1.0}]),
        )]));

        let app = Traeky::open_with_store(
            store,
            paths,
            settings(),
            LegacyCompatibilityConfig::default(),
            None,
        )
        .await
        .unwrap();
        assert!(app.migration_report().legacy_seed_detected);
        assert!(app.vault().overview().has_legacy_data);

        app.vault().create_initial_profile("Alice", "1234").await.unwrap();
        assert_eq!(app.vault().get_active_profile_transactions().unwrap().len(), 1);
        assert!(!app.vault().has_legacy_seed());
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_reopen_restores_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TraekyPaths::with_base_dir(temp_dir.path().to_path_buf());

        let app = Traeky::open(paths.clone(), settings(), LegacyCompatibilityConfig::default(), None)
            .await
            .unwrap();
        app.vault().create_initial_profile("Alice", "1234").await.unwrap();
        app.shutdown().await;

        let app = Traeky::open(paths, settings(), LegacyCompatibilityConfig::default(), None)
            .await
            .unwrap();
        assert_eq!(app.init_source(), &InitSource::Snapshot);
        assert_eq!(app.vault().list_profiles()[0].name, "Alice");
        app.vault().login_profile(app.vault().list_profiles()[0].id.as_str(), "1234")
            .await
            .unwrap();
        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_new_database_logs_out() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let temp_dir = TempDir::new().unwrap();
        let paths = TraekyPaths::with_base_dir(temp_dir.path().to_path_buf());
        let app = Traeky::open_with_store(
            store,
            paths,
            settings(),
            LegacyCompatibilityConfig::default(),
            None,
        )
        .await
        .unwrap();

        app.vault().create_initial_profile("Alice", "1234").await.unwrap();
        app.create_new_database().await.unwrap();

        assert!(!app.vault().is_logged_in());
        assert!(app.vault().list_profiles().is_empty());
        app.shutdown().await;
    }
}
