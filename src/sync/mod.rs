//! Sync engine and portable-file merge
//!
//! Mirrors the shared database into the linked portable file (or the local
//! snapshot), handles open/import/new commands and merges imported files
//! with last-write-wins semantics.

pub mod engine;
pub mod merge;
pub mod pending;
pub mod picker;

pub use engine::{
    DbSyncStatus, InitSource, LinkedFile, SyncConfig, SyncEngine, SyncOutcome, SyncReport,
    SyncState,
};
pub use merge::{merge_imported_db, MergeOutcome};
pub use pending::{deliver_downloads, pending_downloads, queue_download, PendingDownload};
pub use picker::{FilePicker, StaticPicker};
