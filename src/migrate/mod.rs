//! One-time absorption of data written by older storage layouts
//!
//! The migrator only ever runs against an empty profile index, reads every
//! store entry that the current scheme does not own and imports whatever it
//! recognizes. Legacy entries are never modified or deleted, so a migration
//! that goes wrong can be retried from the same inputs. Blobs that cannot be
//! opened are imported as ciphertext and unlocked later at login.

pub mod matcher;
pub mod recognize;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::LegacyCompatibilityConfig;
use crate::crypto::decrypt;
use crate::error::TraekyResult;
use crate::export::{backup_file_name, transactions_to_csv_string};
use crate::models::{
    AppConfig, EncryptedPayload, EncryptionScope, Profile, ProfileDataPayload, ProfileId,
    ProfileIndex, Transaction, VaultDatabase,
};
use crate::storage::{get_typed, keys, set_typed, KeyValueStore};
use crate::sync::{pending_downloads, queue_download, PendingDownload};
use crate::vault::SharedDatabase;

pub use matcher::{assign_orphans, best_match};
pub use recognize::{recognize, recognize_raw, LegacyShape};

/// What one migration pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// A whole earlier database was taken over as is
    pub adopted_snapshot: bool,
    pub imported_profiles: usize,
    /// Imported profiles whose data could not be decrypted yet
    pub opaque_profiles: usize,
    /// Single-profile data is waiting for the first created profile
    pub legacy_seed_detected: bool,
    pub backups_queued: usize,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Report plus the single-profile seed, if one was found
#[derive(Debug, Clone, Default)]
pub struct MigrationOutcome {
    pub report: MigrationReport,
    pub seed: Option<ProfileDataPayload>,
}

/// Everything recognized in one scan of the store
#[derive(Debug, Default)]
struct Artifacts {
    snapshots: Vec<VaultDatabase>,
    indexes: Vec<ProfileIndex>,
    /// Lone blobs by store key
    blobs: Vec<(String, EncryptedPayload)>,
    payload_map: Vec<(String, EncryptedPayload)>,
    pin_hashes: Vec<(String, String)>,
    plain: Vec<ProfileDataPayload>,
    transaction_lists: Vec<Vec<Transaction>>,
    configs: Vec<AppConfig>,
}

impl Artifacts {
    fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
            && self.indexes.is_empty()
            && self.blobs.is_empty()
            && self.payload_map.is_empty()
            && self.plain.is_empty()
            && self.transaction_lists.is_empty()
    }

    fn add(&mut self, key: String, shape: LegacyShape) {
        match shape {
            LegacyShape::DatabaseSnapshot(db) => self.snapshots.push(db),
            LegacyShape::ProfilesIndex(index) => self.indexes.push(index),
            LegacyShape::EncryptedPayload(payload) => self.blobs.push((key, payload)),
            LegacyShape::PayloadMap(map) => self.payload_map.extend(map),
            LegacyShape::PinHashMap(map) => self.pin_hashes.extend(map),
            LegacyShape::PlainProfileData(data) => self.plain.push(data),
            LegacyShape::TransactionList(list) => self.transaction_lists.push(list),
            LegacyShape::AppConfig(config) => self.configs.push(config),
        }
    }
}

/// A profile about to be imported
struct Candidate {
    profile: Profile,
    payload: Option<EncryptedPayload>,
}

pub struct LegacyMigrator {
    store: Arc<dyn KeyValueStore>,
    shared: SharedDatabase,
    legacy: LegacyCompatibilityConfig,
    ran: AtomicBool,
}

impl LegacyMigrator {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        shared: SharedDatabase,
        legacy: LegacyCompatibilityConfig,
    ) -> Self {
        Self {
            store,
            shared,
            legacy,
            ran: AtomicBool::new(false),
        }
    }

    /// Run the migration the first time this is called, `None` afterwards
    pub async fn run_once(&self) -> TraekyResult<Option<MigrationOutcome>> {
        if self.ran.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }
        self.run().await.map(Some)
    }

    /// One migration pass
    ///
    /// Does nothing when profiles already exist. Otherwise, in order of
    /// preference: adopt a whole earlier database, import a multi-profile
    /// layout, or detect single-profile data as a seed.
    pub async fn run(&self) -> TraekyResult<MigrationOutcome> {
        if !self.shared.read(|db| db.index.is_empty()) {
            tracing::debug!(target: "traeky", event = "migration_skipped", reason = "profiles_present");
            return Ok(MigrationOutcome::default());
        }

        let mut artifacts = self.scan().await?;
        if artifacts.is_empty() {
            return Ok(MigrationOutcome::default());
        }

        let outcome = if let Some(snapshot) = take_best_snapshot(&mut artifacts) {
            self.adopt_snapshot(snapshot).await?
        } else {
            let mut candidates = collect_profiles(&mut artifacts);
            if candidates.is_empty() {
                self.detect_seed(artifacts).await?
            } else {
                let current = artifacts
                    .indexes
                    .iter()
                    .find_map(|index| index.current_profile_id.clone());
                let mut report = self.import_profiles(&mut candidates, current).await?;
                report.imported_profiles = candidates.len();
                self.import_pin_hashes(&candidates, &artifacts.pin_hashes).await?;
                MigrationOutcome { report, seed: None }
            }
        };

        tracing::info!(
            target: "traeky",
            event = "migration_finished",
            adopted_snapshot = outcome.report.adopted_snapshot,
            imported = outcome.report.imported_profiles,
            opaque = outcome.report.opaque_profiles,
            seed = outcome.report.legacy_seed_detected,
            backups = outcome.report.backups_queued
        );
        Ok(outcome)
    }

    async fn scan(&self) -> TraekyResult<Artifacts> {
        let mut artifacts = Artifacts::default();
        for entry in self.store.list_all().await? {
            if keys::is_current(&entry.key) {
                continue;
            }
            match recognize_raw(&entry.key, &entry.value) {
                Some(shape) => {
                    tracing::debug!(target: "traeky", event = "legacy_value_recognized", key = %entry.key, shape = shape.kind());
                    artifacts.add(entry.key, shape);
                }
                None => {
                    tracing::debug!(target: "traeky", event = "legacy_value_ignored", key = %entry.key);
                }
            }
        }
        Ok(artifacts)
    }

    async fn adopt_snapshot(&self, mut db: VaultDatabase) -> TraekyResult<MigrationOutcome> {
        db.meta.revision = db.revision().max(self.shared.revision()) + 1;
        db.repair();

        let mut report = MigrationReport {
            adopted_snapshot: true,
            imported_profiles: db.profiles().len(),
            ..MigrationReport::default()
        };
        for profile in db.profiles() {
            let Some(payload) = db.payload(profile.id.as_str()) else {
                continue;
            };
            match self.open_with_app_key(payload).await {
                Some(data) => {
                    if self.queue_backup(&profile.name, &data).await? {
                        report.backups_queued += 1;
                    }
                }
                None => report.opaque_profiles += 1,
            }
        }

        self.shared.replace(db);
        self.save_snapshot().await?;
        Ok(MigrationOutcome { report, seed: None })
    }

    async fn import_profiles(
        &self,
        candidates: &mut [Candidate],
        current: Option<ProfileId>,
    ) -> TraekyResult<MigrationReport> {
        let mut report = MigrationReport::default();

        for candidate in candidates.iter_mut() {
            let Some(payload) = candidate.payload.as_mut() else {
                continue;
            };
            payload.scope.get_or_insert(EncryptionScope::LegacyAppkey);

            match self.open_with_app_key(payload).await {
                Some(data) => {
                    if self.queue_backup(&candidate.profile.name, &data).await? {
                        report.backups_queued += 1;
                    }
                }
                None => report.opaque_profiles += 1,
            }
        }

        self.shared.mutate(|db| {
            for candidate in candidates.iter() {
                let id = candidate.profile.id.clone();
                db.index.upsert(candidate.profile.clone());
                if let Some(payload) = &candidate.payload {
                    db.profile_data.insert(id, payload.clone());
                }
            }
            db.index.current_profile_id = current;
            db.repair();
        });
        self.save_snapshot().await?;
        Ok(report)
    }

    /// Carry old PIN hashes over for imported profiles, keeping existing ones
    async fn import_pin_hashes(
        &self,
        candidates: &[Candidate],
        hashes: &[(String, String)],
    ) -> TraekyResult<()> {
        if hashes.is_empty() {
            return Ok(());
        }
        let mut index: std::collections::BTreeMap<String, String> =
            get_typed(self.store.as_ref(), keys::PIN_INDEX)
                .await?
                .unwrap_or_default();
        let mut changed = false;
        for (id, hash) in hashes {
            let known = candidates.iter().any(|c| c.profile.id.as_str() == id);
            if known && !index.contains_key(id) {
                index.insert(id.clone(), hash.clone());
                changed = true;
            }
        }
        if changed {
            set_typed(self.store.as_ref(), keys::PIN_INDEX, &index).await?;
        }
        Ok(())
    }

    /// Single-profile data: plain values first, then blobs the app key opens
    ///
    /// Blobs that stay closed, and extra opened blobs once a seed is found,
    /// are imported as profiles of their own.
    async fn detect_seed(&self, artifacts: Artifacts) -> TraekyResult<MigrationOutcome> {
        let Artifacts {
            blobs,
            plain,
            transaction_lists,
            configs,
            ..
        } = artifacts;

        let mut seed = plain.into_iter().next().or_else(|| {
            transaction_lists.into_iter().next().map(|transactions| {
                let mut data = ProfileDataPayload {
                    transactions,
                    ..ProfileDataPayload::default()
                };
                data.repair_counter();
                data
            })
        });

        let mut leftovers = Vec::new();
        for (key, payload) in blobs {
            if seed.is_none() {
                if let Some(data) = self.open_with_app_key(&payload).await {
                    seed = Some(data);
                    continue;
                }
            }
            leftovers.push((key, payload));
        }

        if let (Some(seed), Some(config)) = (seed.as_mut(), configs.into_iter().next()) {
            if seed.config == AppConfig::default() {
                seed.config = config;
            }
        }

        let mut report = MigrationReport::default();
        if let Some(data) = &seed {
            report.legacy_seed_detected = true;
            if self.queue_backup("legacy", data).await? {
                report.backups_queued += 1;
            }
        }

        if !leftovers.is_empty() {
            let mut candidates: Vec<Candidate> = leftovers
                .into_iter()
                .enumerate()
                .map(|(n, (_, payload))| Candidate {
                    profile: Profile::new(recovered_name(n)),
                    payload: Some(payload),
                })
                .collect();
            let imported = self.import_profiles(&mut candidates, None).await?;
            report.imported_profiles = candidates.len();
            report.opaque_profiles = imported.opaque_profiles;
            report.backups_queued += imported.backups_queued;
        }

        Ok(MigrationOutcome { report, seed })
    }

    async fn open_with_app_key(&self, payload: &EncryptedPayload) -> Option<ProfileDataPayload> {
        let key = self.legacy.app_key.clone()?;
        let payload = payload.clone();
        match tokio::task::spawn_blocking(move || decrypt(&payload, key.as_str())).await {
            Ok(Ok(plaintext)) => serde_json::from_slice::<Value>(&plaintext)
                .ok()
                .and_then(ProfileDataPayload::from_value_lenient),
            Ok(Err(e)) => {
                tracing::debug!(target: "traeky", event = "legacy_blob_closed", error = %e);
                None
            }
            Err(e) => {
                tracing::warn!(target: "traeky", event = "legacy_decrypt_aborted", error = %e);
                None
            }
        }
    }

    /// Queue a plain-text CSV of a profile's transactions
    ///
    /// Only done when a legacy app key is configured. A backup with the
    /// same content already waiting is not queued twice.
    async fn queue_backup(&self, label: &str, data: &ProfileDataPayload) -> TraekyResult<bool> {
        if self.legacy.app_key.is_none() || data.transactions.is_empty() {
            return Ok(false);
        }
        let content = transactions_to_csv_string(&data.transactions)?;
        let pending = pending_downloads(self.store.as_ref()).await?;
        if pending.iter().any(|item| item.content == content) {
            return Ok(false);
        }

        queue_download(
            self.store.as_ref(),
            PendingDownload {
                file_name: backup_file_name(label, Utc::now()),
                content,
            },
        )
        .await?;
        tracing::info!(target: "traeky", event = "backup_queued", profile = label);
        Ok(true)
    }

    async fn save_snapshot(&self) -> TraekyResult<()> {
        let db = self.shared.snapshot();
        set_typed(self.store.as_ref(), keys::DB_SNAPSHOT, &db).await
    }
}

fn recovered_name(n: usize) -> String {
    if n == 0 {
        "Recovered profile".to_string()
    } else {
        format!("Recovered profile {}", n + 1)
    }
}

/// The non-empty snapshot with the highest revision
fn take_best_snapshot(artifacts: &mut Artifacts) -> Option<VaultDatabase> {
    let snapshots = std::mem::take(&mut artifacts.snapshots);
    snapshots
        .into_iter()
        .filter(|db| !db.index.is_empty())
        .max_by_key(|db| db.revision())
}

/// Profiles from every index, plus ids only known from a payload map
///
/// Payloads come from the payload map by id, then from lone blobs whose key
/// embeds the id. Lone blobs left over become recovered profiles.
fn collect_profiles(artifacts: &mut Artifacts) -> Vec<Candidate> {
    let mut profiles: Vec<Profile> = Vec::new();
    for index in &artifacts.indexes {
        for profile in &index.profiles {
            if !profiles.iter().any(|p| p.id == profile.id) {
                profiles.push(profile.clone());
            }
        }
    }
    for (id, _) in &artifacts.payload_map {
        if !profiles.iter().any(|p| p.id.as_str() == id) {
            let mut profile = Profile::new(format!("Profile {}", profiles.len() + 1));
            profile.id = ProfileId::from(id.as_str());
            profiles.push(profile);
        }
    }
    if profiles.is_empty() {
        return Vec::new();
    }

    let mut candidates: Vec<Candidate> = profiles
        .into_iter()
        .map(|profile| {
            let payload = artifacts
                .payload_map
                .iter()
                .find(|(id, _)| id == profile.id.as_str())
                .map(|(_, payload)| payload.clone());
            Candidate { profile, payload }
        })
        .collect();

    let orphan_ids: Vec<&str> = candidates
        .iter()
        .filter(|c| c.payload.is_none())
        .map(|c| c.profile.id.as_str())
        .collect();
    let blob_keys: Vec<&str> = artifacts.blobs.iter().map(|(k, _)| k.as_str()).collect();
    let assigned: Vec<(String, String)> = assign_orphans(&orphan_ids, &blob_keys)
        .into_iter()
        .map(|(id, key)| (id, key.to_string()))
        .collect();

    for (id, key) in &assigned {
        let blob = artifacts.blobs.iter().find(|(k, _)| k == key);
        let candidate = candidates.iter_mut().find(|c| c.profile.id.as_str() == id);
        if let (Some((_, payload)), Some(candidate)) = (blob, candidate) {
            candidate.payload = Some(payload.clone());
        }
    }

    let leftovers: Vec<EncryptedPayload> = artifacts
        .blobs
        .iter()
        .filter(|(k, _)| !assigned.iter().any(|(_, key)| key == k))
        .map(|(_, payload)| payload.clone())
        .collect();
    for (n, payload) in leftovers.into_iter().enumerate() {
        candidates.push(Candidate {
            profile: Profile::new(recovered_name(n)),
            payload: Some(payload),
        });
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::encrypt_json;
    use crate::models::TxType;
    use crate::storage::MemoryStore;
    use serde_json::json;

    const APP_KEY: &str = "old-app-key";

    fn legacy_config() -> LegacyCompatibilityConfig {
        LegacyCompatibilityConfig::new(Some("salt".into()), Some(APP_KEY.into()))
    }

    fn data_with(n: u64) -> ProfileDataPayload {
        let mut data = ProfileDataPayload::default();
        for id in 1..=n {
            data.transactions.push(Transaction::new(id, "BTC", TxType::Buy, 1.0));
        }
        data.repair_counter();
        data
    }

    fn migrator(store: Arc<MemoryStore>, legacy: LegacyCompatibilityConfig) -> (LegacyMigrator, SharedDatabase) {
        let shared = SharedDatabase::new(VaultDatabase::empty("en"));
        (LegacyMigrator::new(store, shared.clone(), legacy), shared)
    }

    fn sealed(data: &ProfileDataPayload, passphrase: &str) -> Value {
        serde_json::to_value(encrypt_json(data, passphrase).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_nothing_to_migrate() {
        let store = Arc::new(MemoryStore::with_entries([("unrelated", json!(42))]));
        let (migrator, shared) = migrator(store, LegacyCompatibilityConfig::default());
        let outcome = migrator.run().await.unwrap();
        assert!(outcome.report.is_empty());
        assert_eq!(shared.revision(), 0);
    }

    #[tokio::test]
    async fn test_multi_profile_layout_with_app_key() {
        let store = Arc::new(MemoryStore::with_entries([
            (
                "traeky:profiles:index",
                json!({"currentProfileId": "p2", "profiles": [
                    {"id": "p1", "name": "Alice"}, {"id": "p2", "name": "Bob"}
                ]}),
            ),
            ("traeky:profile:p1:data", sealed(&data_with(2), APP_KEY)),
            ("traeky:profile:p2:data", sealed(&data_with(0), "someone else")),
        ]));
        let (migrator, shared) = migrator(store.clone(), legacy_config());

        let outcome = migrator.run().await.unwrap();
        assert_eq!(outcome.report.imported_profiles, 2);
        assert_eq!(outcome.report.opaque_profiles, 1);
        assert_eq!(outcome.report.backups_queued, 1);

        shared.read(|db| {
            assert_eq!(db.index.current_profile_id.as_ref().unwrap().as_str(), "p2");
            let payload = db.payload("p1").unwrap();
            assert_eq!(payload.scope, Some(EncryptionScope::LegacyAppkey));
            assert!(db.payload("p2").is_some());
        });

        let pending = pending_downloads(store.as_ref()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].file_name.starts_with("traeky-backup-alice-"));

        // Legacy entries are left in place
        assert!(store.get("traeky:profile:p1:data").await.unwrap().is_some());
        assert!(store.get(keys::DB_SNAPSHOT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let store = Arc::new(MemoryStore::with_entries([
            (
                "profiles",
                json!({"profiles": [{"id": "p1", "name": "Alice"}]}),
            ),
            ("blob-p1", sealed(&data_with(1), APP_KEY)),
        ]));
        let (migrator, shared) = migrator(store.clone(), legacy_config());

        migrator.run().await.unwrap();
        let entries = store.list_all().await.unwrap();
        let db = shared.snapshot();

        let second = migrator.run().await.unwrap();
        assert!(second.report.is_empty());
        assert_eq!(store.list_all().await.unwrap(), entries);
        assert_eq!(shared.snapshot(), db);
    }

    #[tokio::test]
    async fn test_run_once() {
        let store = Arc::new(MemoryStore::new());
        let (migrator, _) = migrator(store, LegacyCompatibilityConfig::default());
        assert!(migrator.run_once().await.unwrap().is_some());
        assert!(migrator.run_once().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_plain_transaction_list_becomes_seed() {
        let store = Arc::new(MemoryStore::with_entries([
            (
                "transactions",
                json!([{"id": 4, "asset_symbol": "ETH", "tx_type": "BUY", "amount": 2.0}]),
            ),
            ("app_config", json!({"base_currency": "USD"})),
        ]));
        let (migrator, shared) = migrator(store.clone(), LegacyCompatibilityConfig::default());

        let outcome = migrator.run().await.unwrap();
        assert!(outcome.report.legacy_seed_detected);
        assert_eq!(outcome.report.backups_queued, 0);
        let seed = outcome.seed.unwrap();
        assert_eq!(seed.transactions.len(), 1);
        assert_eq!(seed.next_transaction_id, 5);
        assert_eq!(seed.config.base_currency, "USD");
        assert!(shared.read(|db| db.index.is_empty()));
    }

    #[tokio::test]
    async fn test_closed_blob_without_index_is_kept() {
        let store = Arc::new(MemoryStore::with_entries([(
            "traeky:data",
            sealed(&data_with(1), "unknown key"),
        )]));
        let (migrator, shared) = migrator(store, LegacyCompatibilityConfig::default());

        let outcome = migrator.run().await.unwrap();
        assert!(outcome.seed.is_none());
        assert_eq!(outcome.report.imported_profiles, 1);
        assert_eq!(outcome.report.opaque_profiles, 1);
        shared.read(|db| {
            assert_eq!(db.profiles()[0].name, "Recovered profile");
            let payload = db.payload(db.profiles()[0].id.as_str()).unwrap();
            assert_eq!(payload.effective_scope(), EncryptionScope::LegacyAppkey);
        });
    }

    #[tokio::test]
    async fn test_app_key_blob_becomes_seed_with_backup() {
        let store = Arc::new(MemoryStore::with_entries([(
            "traeky:data",
            sealed(&data_with(3), APP_KEY),
        )]));
        let (migrator, _) = migrator(store.clone(), legacy_config());

        let outcome = migrator.run().await.unwrap();
        assert_eq!(outcome.seed.unwrap().transactions.len(), 3);
        assert_eq!(outcome.report.backups_queued, 1);

        // Detecting the same seed again does not queue a second backup
        let again = migrator.run().await.unwrap();
        assert!(again.report.legacy_seed_detected);
        assert_eq!(again.report.backups_queued, 0);
        assert_eq!(pending_downloads(store.as_ref()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_snapshot_adopted_whole() {
        let mut old = VaultDatabase::empty("de");
        let profile = Profile::new("Alice");
        old.index.upsert(profile.clone());
        old.profile_data.insert(
            profile.id.clone(),
            encrypt_json(&data_with(1), "pin-derived").unwrap(),
        );
        old.meta.revision = 12;

        let store = Arc::new(MemoryStore::with_entries([(
            "traeky:db",
            serde_json::to_value(&old).unwrap(),
        )]));
        let (migrator, shared) = migrator(store, LegacyCompatibilityConfig::default());

        let outcome = migrator.run().await.unwrap();
        assert!(outcome.report.adopted_snapshot);
        assert_eq!(outcome.report.imported_profiles, 1);
        assert_eq!(shared.revision(), 13);
        assert_eq!(shared.read(|db| db.ui.lang.clone()), "de");
    }

    #[tokio::test]
    async fn test_legacy_pin_hashes_carried_over() {
        let hash = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
        let store = Arc::new(MemoryStore::with_entries([
            ("profiles", json!({"profiles": [{"id": "p1", "name": "Alice"}]})),
            ("pins", json!({"p1": hash, "ghost": hash})),
        ]));
        let (migrator, _) = migrator(store.clone(), LegacyCompatibilityConfig::default());
        migrator.run().await.unwrap();

        let index: std::collections::BTreeMap<String, String> =
            get_typed(store.as_ref(), keys::PIN_INDEX).await.unwrap().unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index["p1"], hash);
    }
}
