//! Database file CLI commands
//!
//! Manual sync and the open / import / new commands of the portable
//! database file.

use std::path::PathBuf;

use clap::Subcommand;

use crate::app::Traeky;
use crate::display::format_sync_status;
use crate::error::TraekyResult;
use crate::sync::SyncOutcome;

/// Database subcommands
#[derive(Subcommand)]
pub enum DbCommands {
    /// Show sync status
    Status,
    /// Write the database now
    Sync,
    /// Replace the local database with a file and link it
    Open {
        /// Database file (.db, SQLite or JSON)
        path: PathBuf,
    },
    /// Merge a database file into the local one
    Import {
        /// Database file (.db, SQLite or JSON)
        path: PathBuf,
    },
    /// Start over with an empty database
    New {
        /// Confirm without asking
        #[arg(long)]
        yes: bool,
    },
    /// Write the database to a file and keep it in sync
    Link {
        /// Target file
        path: PathBuf,
    },
    /// Stop syncing to the linked file
    Unlink,
}

/// Handle a database command
pub async fn handle_db_command(app: &Traeky, cmd: DbCommands) -> TraekyResult<()> {
    let engine = app.engine();

    match cmd {
        DbCommands::Status => {
            print!("{}", format_sync_status(&engine.status()));
            if !app.is_persistent() {
                println!("Warning: local storage is unavailable; changes are not kept.");
            }
        }

        DbCommands::Sync => {
            let report = app.sync_now().await?;
            match report.outcome {
                SyncOutcome::WrittenToFile(path) => println!("Saved to {}", path.display()),
                SyncOutcome::Downloaded(path) => {
                    println!("No linked file; saved a copy to {}", path.display())
                }
                SyncOutcome::Cancelled => println!("Sync cancelled."),
            }
            for backup in report.delivered_backups {
                println!("Backup written: {}", backup.display());
            }
        }

        DbCommands::Open { path } => {
            app.open_database_file(&path).await?;
            println!("Opened {}", path.display());
            println!("Profiles: {}", app.vault().list_profiles().len());
        }

        DbCommands::Import { path } => {
            let outcome = app.import_database_file(&path).await?;
            println!("Imported {}", path.display());
            println!("  New profiles:      {}", outcome.adopted.len());
            println!("  Updated profiles:  {}", outcome.replaced.len());
            if outcome.conflicts > 0 {
                println!("  Conflicts:         {} (local version kept)", outcome.conflicts);
            }
        }

        DbCommands::New { yes } => {
            if !yes {
                println!("This replaces the local database with an empty one.");
                println!("Re-run with --yes to confirm.");
                return Ok(());
            }
            app.create_new_database().await?;
            println!("Created a new empty database.");
        }

        DbCommands::Link { path } => {
            engine.link_file(&path).await?;
            println!("Linked {}", path.display());
        }

        DbCommands::Unlink => {
            engine.unlink_file().await;
            println!("Unlinked database file.");
        }
    }

    Ok(())
}
