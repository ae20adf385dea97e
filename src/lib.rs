//! Traeky - local-first portfolio tracker
//!
//! This library implements the persistence core of Traeky: an encrypted
//! multi-profile vault, a portable database file that can be moved between
//! devices and merged, and the one-time migration of data written by older
//! storage layouts.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Paths, settings and legacy compatibility secrets
//! - `error`: Custom error types
//! - `crypto`: Passphrase encryption and PIN derivation
//! - `models`: Profiles, payloads, transactions and the database document
//! - `storage`: Durable key-value store
//! - `vault`: Profile vault and the shared in-memory database
//! - `dbfile`: Portable database file (SQLite and JSON encodings)
//! - `sync`: Auto-save, file commands and last-write-wins merge
//! - `migrate`: Legacy layout detection and import
//! - `export`: CSV export
//! - `display`: Terminal formatting
//! - `app`: Wiring of the above
//! - `cli`: Command handlers for the binary
//!
//! # Example
//!
//! ```rust,ignore
//! use traeky::app::Traeky;
//! use traeky::config::{Settings, TraekyPaths};
//!
//! let paths = TraekyPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let legacy = settings.legacy_config();
//! let app = Traeky::open(paths, settings, legacy, None).await?;
//! ```

pub mod app;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod dbfile;
pub mod display;
pub mod error;
pub mod export;
pub mod migrate;
pub mod models;
pub mod storage;
pub mod sync;
pub mod vault;

pub use error::{TraekyError, TraekyResult};
