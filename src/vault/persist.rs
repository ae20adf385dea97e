//! Re-encrypt-and-persist pipeline for profile payloads
//!
//! Every persist writes the full current payload. Persists are numbered when
//! issued; a persist that finishes after a newer one for the same profile is
//! discarded, as is one whose profile was deleted in the meantime. After a
//! payload lands in the shared database the whole database is written to the
//! key-value store as a snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::crypto::{encrypt_json, SecureString};
use crate::error::{TraekyError, TraekyResult};
use crate::models::{EncryptedPayload, EncryptionScope, ProfileDataPayload, ProfileId};
use crate::storage::{keys, set_typed, KeyValueStore};

use super::shared::SharedDatabase;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Clone)]
pub(crate) struct Persister {
    store: Arc<dyn KeyValueStore>,
    shared: SharedDatabase,
    runtime: Handle,
    next_seq: Arc<AtomicU64>,
    applied: Arc<Mutex<HashMap<ProfileId, u64>>>,
    snapshot_lock: Arc<tokio::sync::Mutex<()>>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Persister {
    pub fn new(store: Arc<dyn KeyValueStore>, shared: SharedDatabase, runtime: Handle) -> Self {
        Self {
            store,
            shared,
            runtime,
            next_seq: Arc::new(AtomicU64::new(1)),
            applied: Arc::new(Mutex::new(HashMap::new())),
            snapshot_lock: Arc::new(tokio::sync::Mutex::new(())),
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Number the next persist; call while the mutation is still exclusive
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Treat `seq` as already applied for `id`
    ///
    /// Used when a payload is written straight into the database.
    pub fn claim(&self, id: &ProfileId, seq: u64) {
        let mut applied = lock(&self.applied);
        let entry = applied.entry(id.clone()).or_insert(0);
        *entry = (*entry).max(seq);
    }

    /// Drop sequencing state for a deleted profile
    pub fn forget(&self, id: &ProfileId) {
        lock(&self.applied).remove(id);
    }

    /// Encrypt a payload on the blocking pool
    pub async fn encrypt_payload(
        data: ProfileDataPayload,
        passphrase: SecureString,
    ) -> TraekyResult<EncryptedPayload> {
        tokio::task::spawn_blocking(move || encrypt_json(&data, passphrase.as_str()))
            .await
            .map_err(|e| TraekyError::Encryption(format!("Encryption task failed: {}", e)))?
            .map(|payload| payload.with_scope(EncryptionScope::Pin))
    }

    /// Put an encrypted payload into the database unless it is stale
    fn apply(&self, id: &ProfileId, seq: u64, payload: EncryptedPayload) -> bool {
        let applied = &self.applied;
        self.shared
            .mutate_if(|db| {
                if !db.index.contains(id.as_str()) {
                    return None;
                }
                let mut applied = lock(applied);
                if applied.get(id).is_some_and(|last| *last >= seq) {
                    return None;
                }
                applied.insert(id.clone(), seq);
                db.profile_data.insert(id.clone(), payload);
                if let Some(profile) = db.index.get_mut(id.as_str()) {
                    profile.touch(Utc::now());
                }
                Some(())
            })
            .is_some()
    }

    async fn run(
        &self,
        id: ProfileId,
        seq: u64,
        passphrase: SecureString,
        data: ProfileDataPayload,
    ) -> TraekyResult<bool> {
        let payload = Self::encrypt_payload(data, passphrase).await?;
        if !self.apply(&id, seq, payload) {
            tracing::debug!(target: "traeky", event = "persist_discarded", profile_id = %id, seq);
            return Ok(false);
        }
        self.save_snapshot().await?;
        tracing::debug!(target: "traeky", event = "persist_applied", profile_id = %id, seq);
        Ok(true)
    }

    /// Encrypt and persist now, surfacing any failure
    pub async fn persist_now(
        &self,
        id: &ProfileId,
        passphrase: SecureString,
        data: ProfileDataPayload,
    ) -> TraekyResult<()> {
        let seq = self.next_seq();
        self.run(id.clone(), seq, passphrase, data).await.map(|_| ())
    }

    /// Issue a persist without waiting for it
    ///
    /// Failures are logged; the in-memory session stays authoritative.
    pub fn schedule(
        &self,
        id: ProfileId,
        seq: u64,
        passphrase: SecureString,
        data: ProfileDataPayload,
    ) {
        let this = self.clone();
        self.track(self.runtime.spawn(async move {
            if let Err(e) = this.run(id.clone(), seq, passphrase, data).await {
                tracing::warn!(target: "traeky", event = "persist_failed", profile_id = %id, error = %e);
            }
        }));
    }

    /// Write the whole database to the store under the snapshot key
    pub async fn save_snapshot(&self) -> TraekyResult<()> {
        let _guard = self.snapshot_lock.lock().await;
        let db = self.shared.snapshot();
        set_typed(self.store.as_ref(), keys::DB_SNAPSHOT, &db).await
    }

    /// Issue a snapshot write without waiting for it
    pub fn schedule_snapshot(&self) {
        let this = self.clone();
        self.track(self.runtime.spawn(async move {
            if let Err(e) = this.save_snapshot().await {
                tracing::warn!(target: "traeky", event = "snapshot_failed", error = %e);
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }

    /// Wait for every issued persist to finish
    pub async fn flush(&self) {
        loop {
            let pending: Vec<_> = std::mem::take(&mut *lock(&self.tasks));
            if pending.is_empty() {
                return;
            }
            for task in pending {
                if let Err(e) = task.await {
                    tracing::warn!(target: "traeky", event = "persist_task_panicked", error = %e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::decrypt_json;
    use crate::models::{Profile, VaultDatabase};
    use crate::storage::MemoryStore;

    fn setup() -> (Persister, SharedDatabase, ProfileId) {
        let shared = SharedDatabase::new(VaultDatabase::empty("en"));
        let profile = Profile::new("Alice");
        let id = profile.id.clone();
        shared.mutate(|db| db.index.upsert(profile));
        let persister = Persister::new(Arc::new(MemoryStore::new()), shared.clone(), Handle::current());
        (persister, shared, id)
    }

    fn data_with_counter(next: u64) -> ProfileDataPayload {
        ProfileDataPayload {
            next_transaction_id: next,
            ..ProfileDataPayload::default()
        }
    }

    #[tokio::test]
    async fn test_stale_persist_is_discarded() {
        let (persister, shared, id) = setup();
        let older = persister.next_seq();
        let newer = persister.next_seq();

        persister
            .run(id.clone(), newer, "k".into(), data_with_counter(5))
            .await
            .unwrap();
        let applied = persister
            .run(id.clone(), older, "k".into(), data_with_counter(2))
            .await
            .unwrap();

        assert!(!applied);
        let payload = shared.read(|db| db.payload(id.as_str()).cloned()).unwrap();
        let data: ProfileDataPayload = decrypt_json(&payload, "k").unwrap();
        assert_eq!(data.next_transaction_id, 5);
    }

    #[tokio::test]
    async fn test_persist_for_deleted_profile_is_dropped() {
        let (persister, shared, id) = setup();
        let seq = persister.next_seq();
        shared.mutate(|db| db.remove_profile(id.as_str()));

        let applied = persister
            .run(id.clone(), seq, "k".into(), ProfileDataPayload::default())
            .await
            .unwrap();

        assert!(!applied);
        assert!(shared.read(|db| db.payload(id.as_str()).is_none()));
    }

    #[tokio::test]
    async fn test_flush_waits_for_scheduled() {
        let (persister, shared, id) = setup();
        let seq = persister.next_seq();
        persister.schedule(id.clone(), seq, "k".into(), ProfileDataPayload::default());

        persister.flush().await;

        let payload = shared.read(|db| db.payload(id.as_str()).cloned()).unwrap();
        assert_eq!(payload.scope, Some(EncryptionScope::Pin));
    }
}
