//! Custom error types for Traeky
//!
//! This module defines the error hierarchy for the vault, sync and migration
//! layers using thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for Traeky operations
#[derive(Error, Debug)]
pub enum TraekyError {
    /// Wrong passphrase or corrupted ciphertext (authentication tag mismatch)
    #[error("Decryption failed: wrong PIN or corrupted data")]
    Decryption,

    /// PIN did not match the profile's stored hash
    #[error("Invalid PIN")]
    InvalidPin,

    /// Current PIN supplied to a PIN change did not match
    #[error("Current PIN is incorrect")]
    InvalidCurrentPin,

    /// Profile id is not present in the profile index
    #[error("Profile not found: {id}")]
    ProfileNotFound { id: String },

    /// A session-scoped operation was called without a logged-in profile
    #[error("No active profile session")]
    NoActiveSession,

    /// Database file has the wrong magic or format version
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Durable key-value storage could not be opened
    #[error("Storage unavailable: {0}")]
    StoreUnavailable(String),

    /// Linked database file is no longer accessible
    #[error("File not accessible: {path}: {reason}")]
    FilePermission { path: PathBuf, reason: String },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Malformed encrypted envelope or key derivation failure
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Validation errors for data models
    #[error("Validation error: {0}")]
    Validation(String),

    /// Export errors
    #[error("Export error: {0}")]
    Export(String),

    /// Embedded database errors
    #[error("Database error: {0}")]
    Sqlite(String),

    /// Storage errors
    #[error("Storage error: {0}")]
    Storage(String),
}

impl TraekyError {
    /// Create a "not found" error for profiles
    pub fn profile_not_found(id: impl Into<String>) -> Self {
        Self::ProfileNotFound { id: id.into() }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ProfileNotFound { .. })
    }

    /// Errors the user can fix by retrying with different input
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidPin
                | Self::InvalidCurrentPin
                | Self::Decryption
                | Self::UnsupportedFormat(_)
                | Self::FilePermission { .. }
        )
    }
}

impl From<std::io::Error> for TraekyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TraekyError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<rusqlite::Error> for TraekyError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sqlite(err.to_string())
    }
}

impl From<csv::Error> for TraekyError {
    fn from(err: csv::Error) -> Self {
        Self::Export(err.to_string())
    }
}

/// Result type alias for Traeky operations
pub type TraekyResult<T> = Result<T, TraekyError>;
