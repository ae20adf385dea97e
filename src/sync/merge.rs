//! Last-write-wins merge of an imported database into the local one
//!
//! Profiles are compared by `updated_at`. The strictly newer side wins whole
//! (metadata and ciphertext together). On an exact tie the local side is kept,
//! and if the two ciphertexts differ the tie is counted as a conflict for the
//! user to resolve. Encrypted payloads are never opened here.

use chrono::Utc;

use crate::models::{ProfileId, VaultDatabase, DB_FORMAT_VERSION};

/// Result of [`merge_imported_db`]
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub db: VaultDatabase,
    /// Same profile, same timestamp, different ciphertext
    pub conflicts: u32,
    /// Profiles that only existed in the imported file
    pub adopted: Vec<ProfileId>,
    /// Local profiles replaced by a newer imported version
    pub replaced: Vec<ProfileId>,
}

/// Merge `imported` into `local`
///
/// Local profile order is kept, imported-only profiles are appended in their
/// imported order. The result's revision is above both inputs; UI settings
/// stay local.
pub fn merge_imported_db(local: &VaultDatabase, imported: &VaultDatabase) -> MergeOutcome {
    let mut merged = local.clone();
    let mut conflicts = 0;
    let mut adopted = Vec::new();
    let mut replaced = Vec::new();

    for theirs in imported.profiles() {
        let id = &theirs.id;
        let their_payload = imported.payload(id.as_str());

        let Some(ours) = local.index.get(id.as_str()) else {
            merged.index.profiles.push(theirs.clone());
            if let Some(payload) = their_payload {
                merged.profile_data.insert(id.clone(), payload.clone());
            }
            adopted.push(id.clone());
            continue;
        };

        if theirs.updated_at > ours.updated_at {
            merged.index.upsert(theirs.clone());
            match their_payload {
                Some(payload) => {
                    merged.profile_data.insert(id.clone(), payload.clone());
                }
                None => {
                    merged.profile_data.remove(id);
                }
            }
            replaced.push(id.clone());
        } else if theirs.updated_at == ours.updated_at {
            let our_ciphertext = local.payload(id.as_str()).map(|p| p.ciphertext.as_str());
            let their_ciphertext = their_payload.map(|p| p.ciphertext.as_str());
            if our_ciphertext != their_ciphertext {
                conflicts += 1;
                tracing::warn!(target: "traeky", event = "merge_conflict", profile_id = %id);
            }
        }
    }

    merged.format_version = DB_FORMAT_VERSION;
    merged.created_at = local.created_at.min(imported.created_at);
    merged.updated_at = Utc::now();
    merged.meta.revision = local.revision().max(imported.revision()) + 1;
    if merged.index.current_profile_id.is_none() {
        merged.index.current_profile_id = imported.index.current_profile_id.clone();
    }
    merged.index.repair_current();
    merged.repair();

    tracing::info!(
        target: "traeky",
        event = "databases_merged",
        adopted = adopted.len(),
        replaced = replaced.len(),
        conflicts
    );

    MergeOutcome {
        db: merged,
        conflicts,
        adopted,
        replaced,
    }
}
