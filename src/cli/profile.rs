//! Profile CLI commands
//!
//! Implements CLI commands for profile management.

use clap::Subcommand;

use crate::app::Traeky;
use crate::display::{format_profile_details, format_profile_list};
use crate::error::TraekyResult;

use super::{login, resolve_profile, PinSource};

/// Profile subcommands
#[derive(Subcommand)]
pub enum ProfileCommands {
    /// List all profiles
    List,
    /// Show profile details (requires the PIN)
    Show {
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Create a profile protected by a new PIN
    Create {
        /// Profile name
        name: String,
    },
    /// Rename a profile
    Rename {
        /// New name
        new_name: String,
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Change a profile's PIN
    ChangePin {
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Delete every transaction of a profile, keeping its settings
    Reset {
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
        /// Confirm without asking
        #[arg(long)]
        yes: bool,
    },
    /// Delete a profile and all its data
    Delete {
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
        /// Confirm without asking
        #[arg(long)]
        yes: bool,
    },
}

/// Handle a profile command
pub async fn handle_profile_command(
    app: &Traeky,
    pins: &PinSource,
    cmd: ProfileCommands,
) -> TraekyResult<()> {
    let vault = app.vault();

    match cmd {
        ProfileCommands::List => {
            let overview = vault.overview();
            let current = vault.shared().read(|db| db.index.current_profile_id.clone());
            println!("{}", format_profile_list(&overview.profiles, current.as_ref()).trim_end());
            if overview.has_legacy_data {
                println!();
                println!("Data from an earlier version was found.");
                if overview.profiles.is_empty() {
                    println!("It will be moved into the first profile you create.");
                } else {
                    println!("Log in with the profile's PIN to unlock it.");
                }
            }
        }

        ProfileCommands::Show { profile } => {
            let found = login(app, profile.as_deref(), pins).await?;
            let count = vault.get_active_profile_transactions()?.len();
            print!("{}", format_profile_details(&found, count));
        }

        ProfileCommands::Create { name } => {
            let absorbs_legacy = vault.has_legacy_seed();
            let pin = pins.new_pin()?;
            let profile = vault.create_initial_profile(&name, &pin).await?;

            println!("Created profile: {}", profile.name);
            println!("  ID: {}", profile.id);
            if absorbs_legacy {
                let count = vault.get_active_profile_transactions()?.len();
                println!("  Imported {} transaction(s) from an earlier version", count);
            }
        }

        ProfileCommands::Rename { new_name, profile } => {
            let old = login(app, profile.as_deref(), pins).await?;
            let renamed = vault.rename_active_profile(&new_name)?;
            println!("Renamed profile: {} -> {}", old.name, renamed.name);
        }

        ProfileCommands::ChangePin { profile } => {
            let target = resolve_profile(app, profile.as_deref())?;
            let current = pins.current(&format!("Current PIN for {}: ", target.name))?;
            vault.login_profile(target.id.as_str(), &current).await?;

            let new_pin = pins.new_pin()?;
            vault.change_active_profile_pin(&current, &new_pin).await?;
            println!("PIN changed for profile: {}", target.name);
        }

        ProfileCommands::Reset { profile, yes } => {
            let found = login(app, profile.as_deref(), pins).await?;
            if !yes {
                println!("This deletes every transaction of '{}'.", found.name);
                println!("Re-run with --yes to confirm.");
                return Ok(());
            }
            vault.reset_active_profile_data()?;
            println!("Reset profile: {}", found.name);
        }

        ProfileCommands::Delete { profile, yes } => {
            let found = login(app, profile.as_deref(), pins).await?;
            if !yes {
                println!("This permanently deletes profile '{}' and all its data.", found.name);
                println!("Re-run with --yes to confirm.");
                return Ok(());
            }
            let deleted = vault.delete_active_profile().await?;
            println!("Deleted profile: {}", deleted.name);
        }
    }

    Ok(())
}
