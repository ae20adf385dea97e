//! Path management for Traeky
//!
//! Provides XDG-compliant path resolution for settings, the key-value store
//! and the downloads folder.
//!
//! ## Path Resolution Order
//!
//! 1. `TRAEKY_DATA_DIR` environment variable (if set)
//! 2. Unix (Linux/macOS): `$XDG_CONFIG_HOME/traeky` or `~/.config/traeky`
//! 3. Windows: `%APPDATA%\traeky`

use std::path::PathBuf;

use crate::error::TraekyError;

/// Default file name of the portable database
pub const DEFAULT_DB_FILE_NAME: &str = "traeky.db";

/// Manages all paths used by Traeky
#[derive(Debug, Clone)]
pub struct TraekyPaths {
    /// Base directory for all Traeky data
    base_dir: PathBuf,
}

impl TraekyPaths {
    /// Create a new TraekyPaths instance
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> Result<Self, TraekyError> {
        let base_dir = if let Ok(custom) = std::env::var("TRAEKY_DATA_DIR") {
            PathBuf::from(custom)
        } else {
            resolve_default_path()?
        };

        Ok(Self { base_dir })
    }

    /// Create TraekyPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.config/traeky/ or equivalent)
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Directory backing the durable key-value store
    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    /// Where download fallbacks and CSV safety-net backups are delivered
    pub fn downloads_dir(&self) -> PathBuf {
        self.base_dir.join("downloads")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Suggested location for a newly saved database file
    pub fn default_db_file(&self) -> PathBuf {
        self.base_dir.join(DEFAULT_DB_FILE_NAME)
    }

    /// Ensure all required directories exist
    pub fn ensure_directories(&self) -> Result<(), TraekyError> {
        std::fs::create_dir_all(&self.base_dir)
            .map_err(|e| TraekyError::Io(format!("Failed to create base directory: {}", e)))?;

        std::fs::create_dir_all(self.downloads_dir()).map_err(|e| {
            TraekyError::Io(format!("Failed to create downloads directory: {}", e))
        })?;

        Ok(())
    }
}

/// Resolve the default data directory path based on platform
#[cfg(not(windows))]
fn resolve_default_path() -> Result<PathBuf, TraekyError> {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(config_home).join("traeky"));
    }
    let home = std::env::var("HOME")
        .map_err(|_| TraekyError::Config("Could not determine HOME directory".into()))?;
    Ok(PathBuf::from(home).join(".config").join("traeky"))
}

/// Resolve the default data directory path based on platform
#[cfg(windows)]
fn resolve_default_path() -> Result<PathBuf, TraekyError> {
    let appdata = std::env::var("APPDATA")
        .map_err(|_| TraekyError::Config("Could not determine APPDATA directory".into()))?;
    Ok(PathBuf::from(appdata).join("traeky"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_custom_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TraekyPaths::with_base_dir(temp_dir.path().to_path_buf());

        assert_eq!(paths.base_dir(), temp_dir.path());
        assert_eq!(paths.store_dir(), temp_dir.path().join("store"));
        assert_eq!(paths.downloads_dir(), temp_dir.path().join("downloads"));
        assert_eq!(paths.default_db_file(), temp_dir.path().join("traeky.db"));
    }

    #[test]
    fn test_ensure_directories() {
        let temp_dir = TempDir::new().unwrap();
        let paths = TraekyPaths::with_base_dir(temp_dir.path().join("nested"));

        paths.ensure_directories().unwrap();

        assert!(paths.base_dir().exists());
        assert!(paths.downloads_dir().exists());
    }
}
