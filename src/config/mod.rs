//! Configuration module for Traeky
//!
//! This module provides configuration management including:
//! - XDG-compliant path resolution
//! - User settings persistence
//! - Legacy compatibility secrets

pub mod paths;
pub mod settings;

pub use paths::{TraekyPaths, DEFAULT_DB_FILE_NAME};
pub use settings::{DbFileFormat, LegacyCompatibilityConfig, Settings};
