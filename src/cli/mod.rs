//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the application layer.

pub mod config;
pub mod db;
pub mod export;
pub mod profile;
pub mod tx;

pub use config::handle_config_command;
pub use db::{handle_db_command, DbCommands};
pub use export::{handle_export_command, ExportArgs};
pub use profile::{handle_profile_command, ProfileCommands};
pub use tx::{handle_tx_command, TxCommands};

use crate::app::Traeky;
use crate::error::{TraekyError, TraekyResult};
use crate::models::Profile;

/// Where PINs come from: command-line values, or an interactive prompt
#[derive(Debug, Clone, Default)]
pub struct PinSource {
    pin: Option<String>,
    new_pin: Option<String>,
}

impl PinSource {
    pub fn new(pin: Option<String>, new_pin: Option<String>) -> Self {
        Self { pin, new_pin }
    }

    /// The PIN of an existing profile
    pub fn current(&self, prompt: &str) -> TraekyResult<String> {
        match &self.pin {
            Some(pin) => Ok(pin.clone()),
            None => prompt_pin(prompt),
        }
    }

    /// A PIN being set, confirmed when typed interactively
    pub fn new_pin(&self) -> TraekyResult<String> {
        if let Some(pin) = &self.new_pin {
            return Ok(pin.clone());
        }
        let first = prompt_pin("New PIN: ")?;
        let second = prompt_pin("Confirm PIN: ")?;
        if first != second {
            return Err(TraekyError::Validation("PINs do not match".into()));
        }
        Ok(first)
    }
}

fn prompt_pin(prompt: &str) -> TraekyResult<String> {
    rpassword::prompt_password(prompt)
        .map_err(|e| TraekyError::Io(format!("Failed to read PIN: {}", e)))
}

/// The named profile, else the current one, else the only one
pub fn resolve_profile(app: &Traeky, profile: Option<&str>) -> TraekyResult<Profile> {
    let vault = app.vault();
    if let Some(name) = profile {
        return vault
            .find_profile(name)
            .ok_or_else(|| TraekyError::profile_not_found(name));
    }

    let (current, profiles) = vault
        .shared()
        .read(|db| (db.index.current_profile_id.clone(), db.profiles().to_vec()));
    if profiles.is_empty() {
        return Err(TraekyError::Validation(
            "No profiles yet. Run 'traeky profile create <NAME>' first.".into(),
        ));
    }
    current
        .and_then(|id| profiles.iter().find(|p| p.id == id).cloned())
        .or_else(|| (profiles.len() == 1).then(|| profiles[0].clone()))
        .ok_or_else(|| {
            TraekyError::Validation("Several profiles exist; choose one with --profile".into())
        })
}

/// Resolve a profile and log into it
pub async fn login(app: &Traeky, profile: Option<&str>, pins: &PinSource) -> TraekyResult<Profile> {
    let target = resolve_profile(app, profile)?;
    let pin = pins.current(&format!("PIN for {}: ", target.name))?;
    app.vault().login_profile(target.id.as_str(), &pin).await
}
