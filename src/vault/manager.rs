//! Profile vault: the profile collection and the one active session
//!
//! The vault owns profile creation, login and every operation on the logged-in
//! profile's decrypted data. Index changes are applied to the shared database
//! synchronously; payload re-encryption is issued in the background and can be
//! awaited with [`ProfileVault::flush`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::Value;
use tokio::runtime::Handle;

use crate::config::LegacyCompatibilityConfig;
use crate::crypto::{decrypt, PassphraseSource, PinKeyDerivation, PinScheme, SecureString};
use crate::error::{TraekyError, TraekyResult};
use crate::models::{
    AppConfig, EncryptedPayload, EncryptionScope, Profile, ProfileDataPayload, ProfileId,
    Transaction,
};
use crate::storage::{get_typed, keys, set_typed, KeyValueStore};

use super::persist::{lock, Persister};
use super::session::ActiveProfileSession;
use super::shared::SharedDatabase;

/// What the profile picker shows before anyone logs in
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileOverview {
    pub profiles: Vec<Profile>,
    /// Data from an older storage layout is waiting to be absorbed or unlocked
    pub has_legacy_data: bool,
}

/// Owner of all profiles and of the single active session
pub struct ProfileVault {
    store: Arc<dyn KeyValueStore>,
    shared: SharedDatabase,
    pins: PinKeyDerivation,
    persister: Persister,
    pin_hashes: Mutex<BTreeMap<String, String>>,
    session: Mutex<Option<ActiveProfileSession>>,
    legacy_seed: Mutex<Option<ProfileDataPayload>>,
}

impl ProfileVault {
    /// Open the vault over a store and the shared database
    ///
    /// Loads the PIN-hash index. Must be called from within a Tokio runtime;
    /// background persists run on that runtime.
    pub async fn open(
        store: Arc<dyn KeyValueStore>,
        shared: SharedDatabase,
        legacy: LegacyCompatibilityConfig,
    ) -> TraekyResult<Self> {
        let pin_hashes: BTreeMap<String, String> =
            get_typed(store.as_ref(), keys::PIN_INDEX).await?.unwrap_or_default();
        let persister = Persister::new(store.clone(), shared.clone(), Handle::current());

        Ok(Self {
            store,
            shared,
            pins: PinKeyDerivation::new(legacy),
            persister,
            pin_hashes: Mutex::new(pin_hashes),
            session: Mutex::new(None),
            legacy_seed: Mutex::new(None),
        })
    }

    pub fn shared(&self) -> &SharedDatabase {
        &self.shared
    }

    pub fn pins(&self) -> &PinKeyDerivation {
        &self.pins
    }

    // ---- Profiles ----

    pub fn list_profiles(&self) -> Vec<Profile> {
        self.shared.read(|db| db.profiles().to_vec())
    }

    /// Look a profile up by id, or by name ignoring case
    pub fn find_profile(&self, id_or_name: &str) -> Option<Profile> {
        self.shared.read(|db| {
            db.index
                .get(id_or_name)
                .or_else(|| db.index.find_by_name(id_or_name))
                .cloned()
        })
    }

    pub fn overview(&self) -> ProfileOverview {
        let (profiles, opaque) = self.shared.read(|db| {
            let opaque = db
                .profile_data
                .values()
                .any(|p| p.effective_scope() == EncryptionScope::LegacyAppkey);
            (db.profiles().to_vec(), opaque)
        });
        ProfileOverview {
            profiles,
            has_legacy_data: opaque || self.has_legacy_seed(),
        }
    }

    /// Hand over legacy single-profile data for the next created profile
    pub fn set_legacy_seed(&self, seed: ProfileDataPayload) {
        *lock(&self.legacy_seed) = Some(seed);
    }

    pub fn has_legacy_seed(&self) -> bool {
        lock(&self.legacy_seed).is_some()
    }

    /// Create a profile, make it current and log into it
    ///
    /// A pending legacy seed becomes the new profile's data. Fails, leaving
    /// no trace of the profile, if the store cannot be written.
    pub async fn create_initial_profile(&self, name: &str, pin: &str) -> TraekyResult<Profile> {
        let name = validate_name(name)?;
        validate_pin(pin)?;
        if self.shared.read(|db| db.index.find_by_name(&name).is_some()) {
            return Err(TraekyError::Validation(format!(
                "A profile named '{}' already exists",
                name
            )));
        }

        let profile = Profile::new(name);
        let id = profile.id.clone();

        let seed = lock(&self.legacy_seed).take();
        let absorbed_legacy = seed.is_some();
        let mut data = seed.clone().unwrap_or_default();
        data.repair_counter();

        let passphrase = self.pins.derive_passphrase(id.as_str(), pin);
        let payload = match Persister::encrypt_payload(data.clone(), passphrase.clone()).await {
            Ok(payload) => payload,
            Err(e) => {
                *lock(&self.legacy_seed) = seed;
                return Err(e);
            }
        };

        let seq = self.persister.next_seq();
        self.shared.mutate(|db| {
            db.index.upsert(profile.clone());
            db.profile_data.insert(id.clone(), payload);
            db.index.current_profile_id = Some(id.clone());
        });
        self.persister.claim(&id, seq);

        let durable = match self.store_pin_hash(&id, self.pins.hash_pin(id.as_str(), pin)).await {
            Ok(()) => self.persister.save_snapshot().await,
            Err(e) => Err(e),
        };
        if let Err(e) = durable {
            self.shared.mutate(|db| db.remove_profile(id.as_str()));
            self.persister.forget(&id);
            lock(&self.pin_hashes).remove(id.as_str());
            *lock(&self.legacy_seed) = seed;
            return Err(e);
        }

        *lock(&self.session) = Some(ActiveProfileSession::new(profile.clone(), passphrase, data));
        tracing::info!(
            target: "traeky",
            event = "profile_created",
            profile_id = %id,
            absorbed_legacy
        );
        Ok(profile)
    }

    /// Verify the PIN, decrypt the profile and open a session for it
    ///
    /// Data found under a legacy derivation or the legacy app key is
    /// re-encrypted under the current scheme before this returns.
    pub async fn login_profile(&self, id: &str, pin: &str) -> TraekyResult<Profile> {
        let (profile, payload) = self.shared.read(|db| {
            (db.index.get(id).cloned(), db.payload(id).cloned())
        });
        let profile = profile.ok_or_else(|| TraekyError::profile_not_found(id))?;
        let id = profile.id.clone();

        let stored_hash = lock(&self.pin_hashes).get(id.as_str()).cloned();
        let scheme = stored_hash
            .as_deref()
            .and_then(|hash| self.pins.verify(id.as_str(), pin, hash));
        // A hash that does not match may predate a PIN change merged in from
        // another device. Only the current derivation can prove such a PIN.
        let stale_hash = stored_hash.is_some() && scheme.is_none();
        let candidates = if stale_hash {
            vec![(
                PassphraseSource::Pin(PinScheme::V2),
                self.pins.derive_passphrase(id.as_str(), pin),
            )]
        } else {
            self.pins.candidate_passphrases(id.as_str(), pin)
        };

        let (data, reencrypt) = match &payload {
            Some(payload) => {
                let (source, plaintext) = match decrypt_with_candidates(candidates, payload).await? {
                    Some(found) => found,
                    // Hash matched but nothing decrypts: the ciphertext is damaged.
                    None if scheme.is_some() => return Err(TraekyError::Decryption),
                    None => return Err(TraekyError::InvalidPin),
                };
                let data = ProfileDataPayload::from_value_lenient(plaintext).ok_or_else(|| {
                    TraekyError::Json("Profile data has an unexpected shape".into())
                })?;
                let upgrade = source != PassphraseSource::Pin(PinScheme::V2)
                    || payload.effective_scope() != EncryptionScope::Pin;
                (data, upgrade)
            }
            None if stale_hash => return Err(TraekyError::InvalidPin),
            None => (ProfileDataPayload::default(), true),
        };
        if stale_hash {
            tracing::info!(target: "traeky", event = "pin_hash_replaced", profile_id = %id);
        }

        let passphrase = self.pins.derive_passphrase(id.as_str(), pin);

        if scheme != Some(PinScheme::V2) {
            if let Err(e) = self.store_pin_hash(&id, self.pins.hash_pin(id.as_str(), pin)).await {
                tracing::warn!(target: "traeky", event = "pin_hash_upgrade_failed", profile_id = %id, error = %e);
            }
        }
        if reencrypt {
            match self.persister.persist_now(&id, passphrase.clone(), data.clone()).await {
                Ok(()) => tracing::info!(target: "traeky", event = "payload_upgraded", profile_id = %id),
                Err(e) => {
                    tracing::warn!(target: "traeky", event = "payload_upgrade_failed", profile_id = %id, error = %e)
                }
            }
        }

        let profile = self
            .shared
            .mutate(|db| {
                db.index.current_profile_id = Some(id.clone());
                let profile = db.index.get_mut(id.as_str())?;
                profile.touch(Utc::now());
                Some(profile.clone())
            })
            .unwrap_or(profile);
        self.persister.schedule_snapshot();

        *lock(&self.session) = Some(ActiveProfileSession::new(profile.clone(), passphrase, data));
        tracing::info!(target: "traeky", event = "profile_login", profile_id = %id);
        Ok(profile)
    }

    // ---- Session ----

    pub fn is_logged_in(&self) -> bool {
        lock(&self.session).is_some()
    }

    pub fn active_profile(&self) -> Option<Profile> {
        lock(&self.session).as_ref().map(|s| s.profile().clone())
    }

    /// Drop the session; in-flight persists still complete
    pub fn logout(&self) {
        if let Some(session) = lock(&self.session).take() {
            tracing::info!(target: "traeky", event = "profile_logout", profile_id = %session.profile_id());
        }
    }

    /// Wait for all issued persists
    pub async fn flush(&self) {
        self.persister.flush().await;
    }

    fn with_session<R>(&self, f: impl FnOnce(&ActiveProfileSession) -> R) -> TraekyResult<R> {
        let guard = lock(&self.session);
        let session = guard.as_ref().ok_or(TraekyError::NoActiveSession)?;
        Ok(f(session))
    }

    /// Change session data and issue a persist of the whole payload
    fn mutate_session<R>(
        &self,
        f: impl FnOnce(&mut ProfileDataPayload) -> R,
    ) -> TraekyResult<R> {
        let (result, id, seq, passphrase, data) = {
            let mut guard = lock(&self.session);
            let session = guard.as_mut().ok_or(TraekyError::NoActiveSession)?;
            let result = f(session.data_mut());
            session.data_mut().repair_counter();
            (
                result,
                session.profile_id().clone(),
                self.persister.next_seq(),
                session.passphrase().clone(),
                session.data().clone(),
            )
        };
        self.persister.schedule(id, seq, passphrase, data);
        Ok(result)
    }

    pub fn get_active_profile_transactions(&self) -> TraekyResult<Vec<Transaction>> {
        self.with_session(|s| s.data().transactions.clone())
    }

    pub fn set_active_profile_transactions(&self, transactions: Vec<Transaction>) -> TraekyResult<()> {
        self.mutate_session(|data| data.transactions = transactions)
    }

    pub fn get_active_profile_config(&self) -> TraekyResult<AppConfig> {
        self.with_session(|s| s.data().config.clone())
    }

    pub fn set_active_profile_config(&self, config: AppConfig) -> TraekyResult<()> {
        self.mutate_session(|data| data.config = config)
    }

    /// Reserve the next transaction id
    pub fn next_active_profile_tx_id(&self) -> TraekyResult<u64> {
        self.mutate_session(|data| data.take_next_id())
    }

    /// Append a transaction under a freshly assigned id
    pub fn add_transaction(&self, mut transaction: Transaction) -> TraekyResult<Transaction> {
        self.mutate_session(|data| {
            transaction.id = data.take_next_id();
            data.transactions.push(transaction.clone());
            transaction
        })
    }

    /// Remove a transaction; returns whether it existed
    pub fn delete_transaction(&self, id: u64) -> TraekyResult<bool> {
        self.mutate_session(|data| {
            let before = data.transactions.len();
            data.transactions.retain(|t| t.id != id);
            data.transactions.len() != before
        })
    }

    /// Clear transactions and price caches, keeping config and the id counter
    pub fn reset_active_profile_data(&self) -> TraekyResult<()> {
        self.mutate_session(|data| {
            data.transactions.clear();
            data.price_cache = None;
            data.historical_price_cache = None;
        })
    }

    pub fn rename_active_profile(&self, name: &str) -> TraekyResult<Profile> {
        let name = validate_name(name)?;
        let id = self.with_session(|s| s.profile_id().clone())?;

        let renamed = self.shared.try_mutate(|db| {
            if db
                .index
                .find_by_name(&name)
                .is_some_and(|other| other.id != id)
            {
                return Err(TraekyError::Validation(format!(
                    "A profile named '{}' already exists",
                    name
                )));
            }
            let profile = db
                .index
                .get_mut(id.as_str())
                .ok_or_else(|| TraekyError::profile_not_found(id.as_str()))?;
            profile.name = name;
            profile.touch(Utc::now());
            Ok(profile.clone())
        })?;

        if let Some(session) = lock(&self.session).as_mut() {
            session.set_profile(renamed.clone());
        }
        self.persister.schedule_snapshot();
        Ok(renamed)
    }

    /// Check a PIN against the active session's key
    pub fn verify_active_profile_pin(&self, pin: &str) -> TraekyResult<bool> {
        self.with_session(|s| {
            s.passphrase() == &self.pins.derive_passphrase(s.profile_id().as_str(), pin)
        })
    }

    /// Re-encrypt the active profile under a new PIN
    pub async fn change_active_profile_pin(&self, current_pin: &str, new_pin: &str) -> TraekyResult<()> {
        if !self.verify_active_profile_pin(current_pin)? {
            return Err(TraekyError::InvalidCurrentPin);
        }
        validate_pin(new_pin)?;

        let (id, data) = self.with_session(|s| (s.profile_id().clone(), s.data().clone()))?;
        let passphrase = self.pins.derive_passphrase(id.as_str(), new_pin);
        let previous_payload = self.shared.read(|db| db.payload(id.as_str()).cloned());
        let previous_hash = lock(&self.pin_hashes).get(id.as_str()).cloned();

        let mut changed = self
            .persister
            .persist_now(&id, passphrase.clone(), data)
            .await;
        if changed.is_ok() {
            changed = self
                .store_pin_hash(&id, self.pins.hash_pin(id.as_str(), new_pin))
                .await;
        }
        if let Err(e) = changed {
            self.restore_pin(&id, previous_payload, previous_hash).await;
            return Err(e);
        }
        if let Some(session) = lock(&self.session).as_mut() {
            session.set_passphrase(passphrase);
        }

        tracing::info!(target: "traeky", event = "pin_changed", profile_id = %id);
        Ok(())
    }

    /// Remove the active profile's metadata, ciphertext and PIN hash
    pub async fn delete_active_profile(&self) -> TraekyResult<Profile> {
        let session = lock(&self.session)
            .take()
            .ok_or(TraekyError::NoActiveSession)?;
        let id = session.profile_id().clone();

        let removed = self
            .shared
            .mutate(|db| db.remove_profile(id.as_str()))
            .unwrap_or_else(|| session.profile().clone());
        self.persister.forget(&id);

        if let Err(e) = self.remove_pin_hash(&id).await {
            tracing::warn!(target: "traeky", event = "pin_hash_remove_failed", profile_id = %id, error = %e);
        }
        if let Err(e) = self.persister.save_snapshot().await {
            tracing::warn!(target: "traeky", event = "snapshot_failed", error = %e);
        }

        tracing::info!(target: "traeky", event = "profile_deleted", profile_id = %id);
        Ok(removed)
    }

    /// Re-sync the session after the database was replaced or merged
    ///
    /// Returns whether a session is still active afterwards.
    pub async fn reload_session(&self) -> TraekyResult<bool> {
        let Some((id, passphrase)) = lock(&self.session)
            .as_ref()
            .map(|s| (s.profile_id().clone(), s.passphrase().clone()))
        else {
            return Ok(false);
        };

        let (profile, payload) = self
            .shared
            .read(|db| (db.index.get(id.as_str()).cloned(), db.payload(id.as_str()).cloned()));
        let Some(profile) = profile else {
            tracing::info!(target: "traeky", event = "session_profile_vanished", profile_id = %id);
            self.logout();
            return Ok(false);
        };

        let data = match payload {
            Some(payload) => match decrypt_blocking(payload, passphrase).await {
                Ok(plaintext) => {
                    let value: Value = serde_json::from_slice(&plaintext)?;
                    ProfileDataPayload::from_value_lenient(value)
                }
                Err(TraekyError::Decryption) => {
                    tracing::warn!(target: "traeky", event = "session_key_stale", profile_id = %id);
                    self.logout();
                    return Ok(false);
                }
                Err(e) => return Err(e),
            },
            None => None,
        };

        if let Some(session) = lock(&self.session).as_mut() {
            session.set_profile(profile);
            if let Some(data) = data {
                session.set_data(data);
            }
        }
        Ok(true)
    }

    /// Put back the ciphertext and hash that were current before a failed PIN change
    async fn restore_pin(
        &self,
        id: &ProfileId,
        payload: Option<EncryptedPayload>,
        hash: Option<String>,
    ) {
        self.shared.mutate(|db| match payload {
            Some(payload) => {
                db.profile_data.insert(id.clone(), payload);
            }
            None => {
                db.profile_data.remove(id);
            }
        });
        let hashes = {
            let mut hashes = lock(&self.pin_hashes);
            match hash {
                Some(hash) => hashes.insert(id.to_string(), hash),
                None => hashes.remove(id.as_str()),
            };
            hashes.clone()
        };
        tracing::warn!(target: "traeky", event = "pin_change_rolled_back", profile_id = %id);

        if let Err(e) = set_typed(self.store.as_ref(), keys::PIN_INDEX, &hashes).await {
            tracing::warn!(target: "traeky", event = "pin_hash_restore_failed", profile_id = %id, error = %e);
        }
        if let Err(e) = self.persister.save_snapshot().await {
            tracing::warn!(target: "traeky", event = "snapshot_failed", error = %e);
        }
    }

    // ---- PIN-hash index ----

    async fn store_pin_hash(&self, id: &ProfileId, hash: String) -> TraekyResult<()> {
        let snapshot = {
            let mut hashes = lock(&self.pin_hashes);
            hashes.insert(id.to_string(), hash);
            hashes.clone()
        };
        set_typed(self.store.as_ref(), keys::PIN_INDEX, &snapshot).await
    }

    async fn remove_pin_hash(&self, id: &ProfileId) -> TraekyResult<()> {
        let snapshot = {
            let mut hashes = lock(&self.pin_hashes);
            hashes.remove(id.as_str());
            hashes.clone()
        };
        set_typed(self.store.as_ref(), keys::PIN_INDEX, &snapshot).await
    }
}

async fn decrypt_with_candidates(
    candidates: Vec<(PassphraseSource, SecureString)>,
    payload: &EncryptedPayload,
) -> TraekyResult<Option<(PassphraseSource, Value)>> {
    for (source, passphrase) in candidates {
        match decrypt_blocking(payload.clone(), passphrase).await {
            Ok(plaintext) => return Ok(Some((source, serde_json::from_slice(&plaintext)?))),
            Err(TraekyError::Decryption) => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

async fn decrypt_blocking(payload: EncryptedPayload, passphrase: SecureString) -> TraekyResult<Vec<u8>> {
    tokio::task::spawn_blocking(move || decrypt(&payload, passphrase.as_str()))
        .await
        .map_err(|e| TraekyError::Encryption(format!("Decryption task failed: {}", e)))?
}

fn validate_name(name: &str) -> TraekyResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TraekyError::Validation("Profile name cannot be empty".into()));
    }
    Ok(name.to_string())
}

fn validate_pin(pin: &str) -> TraekyResult<()> {
    if pin.is_empty() {
        return Err(TraekyError::Validation("PIN cannot be empty".into()));
    }
    Ok(())
}
