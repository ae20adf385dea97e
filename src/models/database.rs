//! The vault database: every profile, its ciphertext and shared UI settings
//!
//! This is the logical content of the portable database file and of the local
//! snapshot. `meta.revision` increases on every mutation and is the signal
//! used to decide which of two copies is newer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::ProfileId;
use super::payload::EncryptedPayload;
use super::profile::{Profile, ProfileIndex};

/// Format version of the database document
pub const DB_FORMAT_VERSION: u32 = 1;

/// Settings shared by all profiles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiSettings {
    pub lang: String,
    pub mode: String,
}

impl UiSettings {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            mode: "light".to_string(),
        }
    }
}

/// Bookkeeping that is not user data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DbMeta {
    pub revision: u64,
}

/// All profiles plus shared settings, persisted as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultDatabase {
    #[serde(rename = "version")]
    pub format_version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub index: ProfileIndex,
    pub profile_data: BTreeMap<ProfileId, EncryptedPayload>,
    pub ui: UiSettings,
    pub meta: DbMeta,
}

impl VaultDatabase {
    /// A brand-new database with no profiles
    pub fn empty(lang: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            format_version: DB_FORMAT_VERSION,
            created_at: now,
            updated_at: now,
            index: ProfileIndex::default(),
            profile_data: BTreeMap::new(),
            ui: UiSettings::new(lang),
            meta: DbMeta::default(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.meta.revision
    }

    pub fn profiles(&self) -> &[Profile] {
        &self.index.profiles
    }

    pub fn payload(&self, id: &str) -> Option<&EncryptedPayload> {
        self.profile_data.get(id)
    }

    /// Record one mutation
    pub fn bump_revision(&mut self) {
        self.meta.revision += 1;
        self.updated_at = Utc::now();
    }

    /// Remove a profile's metadata and ciphertext together
    pub fn remove_profile(&mut self, id: &str) -> Option<Profile> {
        self.profile_data.remove(id);
        self.index.remove(id)
    }

    /// Drop ciphertext that no profile refers to and fix the current pointer
    pub fn repair(&mut self) {
        let index = &self.index;
        self.profile_data.retain(|id, _| index.contains(id.as_str()));
        self.index.repair_current();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payload::{PAYLOAD_ALGORITHM, PAYLOAD_VERSION};

    fn payload() -> EncryptedPayload {
        EncryptedPayload {
            version: PAYLOAD_VERSION,
            algorithm: PAYLOAD_ALGORITHM.into(),
            salt: "cw==".into(),
            iv: "aQ==".into(),
            ciphertext: "Yw==".into(),
            scope: None,
        }
    }

    #[test]
    fn test_empty_database() {
        let db = VaultDatabase::empty("de");
        assert_eq!(db.format_version, DB_FORMAT_VERSION);
        assert_eq!(db.revision(), 0);
        assert_eq!(db.ui.lang, "de");
        assert!(db.profiles().is_empty());
    }

    #[test]
    fn test_remove_profile_drops_payload() {
        let mut db = VaultDatabase::empty("en");
        let profile = Profile::new("Alice");
        let id = profile.id.clone();
        db.index.upsert(profile);
        db.profile_data.insert(id.clone(), payload());

        db.remove_profile(id.as_str());

        assert!(db.payload(id.as_str()).is_none());
        assert!(db.index.is_empty());
    }

    #[test]
    fn test_repair_drops_orphans() {
        let mut db = VaultDatabase::empty("en");
        db.profile_data.insert(ProfileId::from("orphan"), payload());
        db.repair();
        assert!(db.profile_data.is_empty());
    }

    #[test]
    fn test_json_top_level_shape() {
        let json = serde_json::to_value(VaultDatabase::empty("en")).unwrap();
        assert_eq!(json["version"], 1);
        assert!(json.get("profileData").is_some());
        assert!(json.get("createdAt").is_some());
        assert_eq!(json["meta"]["revision"], 0);
    }
}
