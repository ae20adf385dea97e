//! Transaction CLI commands

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use clap::Subcommand;

use crate::app::Traeky;
use crate::display::format_transaction_register;
use crate::error::{TraekyError, TraekyResult};
use crate::models::{Transaction, TxType};

use super::{login, PinSource};

/// Transaction subcommands
#[derive(Subcommand)]
pub enum TxCommands {
    /// List transactions, newest last
    List {
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
        /// Number of transactions to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },
    /// Add a transaction
    Add {
        /// Asset symbol (e.g. BTC)
        asset: String,
        /// BUY, SELL, TRANSFER_IN, TRANSFER_OUT, REWARD or FEE
        tx_type: String,
        /// Quantity of the asset
        amount: f64,
        /// Unit price in fiat
        #[arg(long)]
        price: Option<f64>,
        /// Fiat currency (defaults to the profile's base currency)
        #[arg(long)]
        currency: Option<String>,
        /// Fee in fiat
        #[arg(long)]
        fee: Option<f64>,
        /// Date (YYYY-MM-DD) or RFC 3339 timestamp; defaults to now
        #[arg(short, long)]
        date: Option<String>,
        /// Free-text note
        #[arg(short, long)]
        note: Option<String>,
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
    },
    /// Delete a transaction by ID
    Delete {
        /// Transaction ID
        id: u64,
        /// Profile name or ID
        #[arg(short, long)]
        profile: Option<String>,
    },
}

/// Handle a transaction command
pub async fn handle_tx_command(app: &Traeky, pins: &PinSource, cmd: TxCommands) -> TraekyResult<()> {
    let vault = app.vault();

    match cmd {
        TxCommands::List { profile, limit } => {
            login(app, profile.as_deref(), pins).await?;
            let transactions = vault.get_active_profile_transactions()?;
            let skip = transactions.len().saturating_sub(limit);
            print!("{}", format_transaction_register(&transactions[skip..]));
        }

        TxCommands::Add {
            asset,
            tx_type,
            amount,
            price,
            currency,
            fee,
            date,
            note,
            profile,
        } => {
            let kind: TxType = tx_type.parse().map_err(TraekyError::Validation)?;
            if !(amount.is_finite() && amount > 0.0) {
                return Err(TraekyError::Validation(format!(
                    "Amount must be a positive number, got {}",
                    amount
                )));
            }
            let timestamp = parse_date(date.as_deref())?;

            login(app, profile.as_deref(), pins).await?;
            let base_currency = vault.get_active_profile_config()?.base_currency;

            let mut tx = Transaction::new(0, asset.trim().to_uppercase(), kind, amount);
            tx.price_fiat = price;
            tx.fiat_currency = currency.unwrap_or(base_currency).to_uppercase();
            tx.fee_fiat = fee;
            tx.timestamp = timestamp;
            tx.note = note.filter(|n| !n.trim().is_empty());

            let added = vault.add_transaction(tx)?;
            println!(
                "Added transaction {}: {} {} {}",
                added.id, added.tx_type, added.amount, added.asset_symbol
            );
        }

        TxCommands::Delete { id, profile } => {
            login(app, profile.as_deref(), pins).await?;
            if vault.delete_transaction(id)? {
                println!("Deleted transaction {}", id);
            } else {
                return Err(TraekyError::Validation(format!("No transaction with ID {}", id)));
            }
        }
    }

    Ok(())
}

/// Normalize user input to an RFC 3339 timestamp
fn parse_date(input: Option<&str>) -> TraekyResult<String> {
    let Some(input) = input.map(str::trim) else {
        return Ok(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    };
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(format!("{}T00:00:00Z", date.format("%Y-%m-%d")));
    }
    DateTime::parse_from_rfc3339(input)
        .map(|at| at.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
        .map_err(|_| {
            TraekyError::Validation(format!(
                "Invalid date '{}'. Use YYYY-MM-DD or an RFC 3339 timestamp.",
                input
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(Some("2024-03-01")).unwrap(), "2024-03-01T00:00:00Z");
        assert_eq!(
            parse_date(Some("2024-03-01T12:30:00+02:00")).unwrap(),
            "2024-03-01T10:30:00Z"
        );
        assert!(parse_date(Some("yesterday")).is_err());
        assert!(parse_date(None).unwrap().ends_with('Z'));
    }
}
