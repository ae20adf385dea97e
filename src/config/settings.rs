//! User settings for Traeky
//!
//! Manages UI preferences, the authoritative portable file format, auto-save
//! timing and the optional legacy compatibility secrets.

use serde::{Deserialize, Serialize};

use super::paths::TraekyPaths;
use crate::crypto::SecureString;
use crate::error::TraekyError;

/// Which encoding new portable database files are written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbFileFormat {
    /// Embedded relational single-file database
    #[default]
    Sqlite,
    /// JSON text document
    Json,
}

/// Secrets that only exist to read data written before per-profile PINs.
///
/// Both values are optional. When absent, the corresponding legacy code paths
/// are skipped and legacy blobs are carried over as opaque ciphertext.
#[derive(Debug, Clone, Default)]
pub struct LegacyCompatibilityConfig {
    /// Salt mixed into v1 PIN hashes and passphrases
    pub global_salt: Option<String>,
    /// Fixed passphrase that encrypted pre-PIN profile data
    pub app_key: Option<SecureString>,
}

impl LegacyCompatibilityConfig {
    pub fn new(global_salt: Option<String>, app_key: Option<String>) -> Self {
        Self {
            global_salt: global_salt.filter(|s| !s.is_empty()),
            app_key: app_key.filter(|s| !s.is_empty()).map(SecureString::new),
        }
    }

    /// Salt used by v1 derivations; empty when unconfigured
    pub fn global_salt(&self) -> &str {
        self.global_salt.as_deref().unwrap_or("")
    }

    pub fn app_key(&self) -> Option<&str> {
        self.app_key.as_ref().map(|k| k.as_str())
    }

    /// Overlay values from `TRAEKY_LEGACY_GLOBAL_SALT` / `TRAEKY_LEGACY_APP_KEY`
    pub fn with_env_overrides(self) -> Self {
        let salt = std::env::var("TRAEKY_LEGACY_GLOBAL_SALT")
            .ok()
            .or(self.global_salt);
        let key = std::env::var("TRAEKY_LEGACY_APP_KEY")
            .ok()
            .or_else(|| self.app_key.map(|k| k.as_str().to_string()));
        Self::new(salt, key)
    }
}

/// Legacy secrets as stored in the settings file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegacySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_salt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_key: Option<String>,
}

/// User settings for Traeky
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// UI language, also the fallback when a database file has none
    #[serde(default = "default_lang")]
    pub lang: String,

    /// UI colour mode
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Encoding used when writing portable database files
    #[serde(default)]
    pub db_format: DbFileFormat,

    /// Quiet period before dirty state is auto-saved
    #[serde(default = "default_autosave_debounce_ms")]
    pub autosave_debounce_ms: u64,

    /// Legacy compatibility secrets
    #[serde(default)]
    pub legacy: LegacySettings,
}

fn default_schema_version() -> u32 {
    1
}

fn default_lang() -> String {
    "en".to_string()
}

fn default_mode() -> String {
    "light".to_string()
}

fn default_autosave_debounce_ms() -> u64 {
    1000
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            lang: default_lang(),
            mode: default_mode(),
            db_format: DbFileFormat::default(),
            autosave_debounce_ms: default_autosave_debounce_ms(),
            legacy: LegacySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or return defaults if the file doesn't exist
    pub fn load_or_create(paths: &TraekyPaths) -> Result<Self, TraekyError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| TraekyError::Io(format!("Failed to read settings file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| TraekyError::Config(format!("Failed to parse settings file: {}", e)))
    }

    /// Save settings to disk
    pub fn save(&self, paths: &TraekyPaths) -> Result<(), TraekyError> {
        paths.ensure_directories()?;

        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| TraekyError::Config(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(paths.settings_file(), contents)
            .map_err(|e| TraekyError::Io(format!("Failed to write settings file: {}", e)))?;

        Ok(())
    }

    /// Legacy secrets from the settings file only
    pub fn legacy_config(&self) -> LegacyCompatibilityConfig {
        LegacyCompatibilityConfig::new(
            self.legacy.global_salt.clone(),
            self.legacy.app_key.clone(),
        )
    }
}
