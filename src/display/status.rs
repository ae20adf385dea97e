//! Sync status display

use crate::sync::DbSyncStatus;

/// Format the database sync status block
pub fn format_sync_status(status: &DbSyncStatus) -> String {
    let state = if status.is_initializing {
        "initializing"
    } else if !status.is_ready {
        "not ready"
    } else if status.is_dirty {
        "unsaved changes"
    } else {
        "in sync"
    };

    let mut output = String::new();
    output.push_str(&format!("State:       {}\n", state));
    output.push_str(&format!(
        "File:        {}\n",
        status.file_label.as_deref().unwrap_or("(not linked)")
    ));
    output.push_str(&format!("Revision:    {}\n", status.db_revision));
    output.push_str(&format!(
        "Last synced: {}\n",
        status
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string())
    ));
    if status.conflicts > 0 {
        output.push_str(&format!("Conflicts:   {}\n", status.conflicts));
    }
    output
}
