//! PIN hashing and PIN-to-passphrase derivation
//!
//! Two schemes coexist:
//!
//! - **v1** (legacy): derived from `global_salt + pin`. The same PIN yields the
//!   same hash and passphrase for every profile. Only ever read, never written.
//! - **v2** (current): derived from `profile_id + pin`, so a PIN guessed for one
//!   profile says nothing about another profile using the same digits.
//!
//! Hashes are one-way and only used for login verification. Passphrases feed
//! [`crate::crypto::encryption`] and are never persisted.

use sha2::{Digest, Sha256};

use crate::config::LegacyCompatibilityConfig;

use super::SecureString;

const V2_PASSPHRASE_PREFIX: &str = "traeky:v2:";

/// Which derivation produced a hash or passphrase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinScheme {
    /// `global_salt + pin`
    V1Legacy,
    /// `profile_id + pin`
    V2,
}

/// Where a decryption passphrase candidate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassphraseSource {
    Pin(PinScheme),
    /// The fixed legacy application key
    LegacyAppKey,
}

/// Derives PIN hashes and passphrases, including the legacy paths
#[derive(Debug, Clone, Default)]
pub struct PinKeyDerivation {
    legacy: LegacyCompatibilityConfig,
}

impl PinKeyDerivation {
    pub fn new(legacy: LegacyCompatibilityConfig) -> Self {
        Self { legacy }
    }

    pub fn legacy(&self) -> &LegacyCompatibilityConfig {
        &self.legacy
    }

    /// Current (v2) PIN hash for a profile
    pub fn hash_pin(&self, profile_id: &str, pin: &str) -> String {
        sha256_hex(&format!("{}:{}", profile_id, pin))
    }

    /// Legacy (v1) PIN hash, valid across all profiles
    pub fn hash_pin_legacy(&self, pin: &str) -> String {
        sha256_hex(&format!("{}{}", self.legacy.global_salt(), pin))
    }

    /// Current (v2) encryption passphrase for a profile
    pub fn derive_passphrase(&self, profile_id: &str, pin: &str) -> SecureString {
        SecureString::new(format!("{}{}:{}", V2_PASSPHRASE_PREFIX, profile_id, pin))
    }

    /// Legacy (v1) encryption passphrase
    pub fn derive_passphrase_legacy(&self, pin: &str) -> SecureString {
        SecureString::new(format!("{}:{}", self.legacy.global_salt(), pin))
    }

    /// Check a PIN against a stored hash, trying the legacy scheme first
    pub fn verify(&self, profile_id: &str, pin: &str, stored_hash: &str) -> Option<PinScheme> {
        if self.hash_pin_legacy(pin) == stored_hash {
            Some(PinScheme::V1Legacy)
        } else if self.hash_pin(profile_id, pin) == stored_hash {
            Some(PinScheme::V2)
        } else {
            None
        }
    }

    /// Passphrases to try when decrypting a profile, in order
    ///
    /// v2 first, then v1, then the legacy app key if one is configured.
    pub fn candidate_passphrases(
        &self,
        profile_id: &str,
        pin: &str,
    ) -> Vec<(PassphraseSource, SecureString)> {
        let mut candidates = vec![
            (
                PassphraseSource::Pin(PinScheme::V2),
                self.derive_passphrase(profile_id, pin),
            ),
            (
                PassphraseSource::Pin(PinScheme::V1Legacy),
                self.derive_passphrase_legacy(pin),
            ),
        ];
        if let Some(app_key) = self.legacy.app_key.clone() {
            candidates.push((PassphraseSource::LegacyAppKey, app_key));
        }
        candidates
    }
}

fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}
