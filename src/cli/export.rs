//! Export CLI command

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::Args;

use crate::app::Traeky;
use crate::error::{TraekyError, TraekyResult};
use crate::export::write_transactions_csv;

use super::{login, PinSource};

/// Arguments of `traeky export`
#[derive(Args)]
pub struct ExportArgs {
    /// Profile name or ID
    #[arg(short, long)]
    pub profile: Option<String>,
    /// Output file (stdout if omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// Export the profile's transactions as CSV
pub async fn handle_export_command(
    app: &Traeky,
    pins: &PinSource,
    args: ExportArgs,
) -> TraekyResult<()> {
    let profile = login(app, args.profile.as_deref(), pins).await?;
    let transactions = app.vault().get_active_profile_transactions()?;

    match args.out {
        Some(path) => {
            let file = File::create(&path).map_err(|e| {
                TraekyError::Export(format!("Failed to create {}: {}", path.display(), e))
            })?;
            write_transactions_csv(BufWriter::new(file), &transactions)?;
            eprintln!(
                "Exported {} transaction(s) of '{}' to {}",
                transactions.len(),
                profile.name,
                path.display()
            );
        }
        None => write_transactions_csv(io::stdout().lock(), &transactions)?,
    }

    Ok(())
}
