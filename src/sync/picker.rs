//! File dialogs
//!
//! The save/open dialogs of a UI are modelled as an async trait. A dialog may
//! wait on a human indefinitely and may be dismissed; dismissal is `None`,
//! never an error.

use std::path::PathBuf;

use async_trait::async_trait;

#[async_trait]
pub trait FilePicker: Send + Sync {
    /// Ask where to save a new database file
    async fn pick_save_path(&self, suggested_name: &str) -> Option<PathBuf>;

    /// Ask which database file to open
    async fn pick_open_path(&self) -> Option<PathBuf>;
}

/// Picker that always answers with fixed paths
#[derive(Debug, Clone, Default)]
pub struct StaticPicker {
    save: Option<PathBuf>,
    open: Option<PathBuf>,
}

impl StaticPicker {
    /// Answer both dialogs with `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            save: Some(path.clone()),
            open: Some(path),
        }
    }

    /// A user who dismisses every dialog
    pub fn cancelled() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FilePicker for StaticPicker {
    async fn pick_save_path(&self, _suggested_name: &str) -> Option<PathBuf> {
        self.save.clone()
    }

    async fn pick_open_path(&self) -> Option<PathBuf> {
        self.open.clone()
    }
}
