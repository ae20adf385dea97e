//! Encrypted payload envelope
//!
//! The versioned JSON envelope that wraps every profile's financial data.
//! Binary fields are base64 so the envelope can live in JSON documents and
//! in text columns of the relational file format.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current envelope format version
pub const PAYLOAD_VERSION: u32 = 1;

/// The only algorithm tag ever written
pub const PAYLOAD_ALGORITHM: &str = "AES-GCM";

/// Which kind of secret the envelope was encrypted under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EncryptionScope {
    /// Passphrase derived from the profile id and PIN
    Pin,
    /// Fixed application key from before per-profile PINs
    LegacyAppkey,
}

impl EncryptionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pin => "pin",
            Self::LegacyAppkey => "legacy-appkey",
        }
    }

    /// Parse a stored tag; unknown tags read as absent
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pin" => Some(Self::Pin),
            "legacy-appkey" => Some(Self::LegacyAppkey),
            _ => None,
        }
    }
}

impl fmt::Display for EncryptionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// AES-GCM ciphertext plus everything needed to decrypt it given the passphrase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    pub version: u32,
    pub algorithm: String,
    /// Key-derivation salt (base64)
    pub salt: String,
    /// AES-GCM nonce (base64)
    pub iv: String,
    /// Ciphertext with authentication tag (base64)
    pub ciphertext: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<EncryptionScope>,
}

impl EncryptedPayload {
    /// Same envelope with a different scope tag
    pub fn with_scope(mut self, scope: EncryptionScope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Scope, treating untagged envelopes as PIN-derived
    pub fn effective_scope(&self) -> EncryptionScope {
        self.scope.unwrap_or(EncryptionScope::Pin)
    }
}
