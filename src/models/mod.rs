//! Core data models for Traeky
//!
//! This module contains the data structures persisted by the vault: profile
//! metadata, the encrypted payload envelope, the decrypted profile contents
//! and the database document that carries them all.

pub mod database;
pub mod ids;
pub mod payload;
pub mod profile;
pub mod profile_data;
pub mod transaction;

pub use database::{DbMeta, UiSettings, VaultDatabase, DB_FORMAT_VERSION};
pub use ids::ProfileId;
pub use payload::{EncryptedPayload, EncryptionScope, PAYLOAD_ALGORITHM, PAYLOAD_VERSION};
pub use profile::{Profile, ProfileIndex};
pub use profile_data::{AppConfig, ProfileDataPayload, PROFILE_DATA_VERSION};
pub use transaction::{Transaction, TxType};
