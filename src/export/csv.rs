//! CSV export of a profile's transactions
//!
//! Used for the `export` command and for the plain-text safety-net backups
//! written before legacy data is migrated.

use std::io::Write;

use chrono::{DateTime, Utc};

use crate::error::{TraekyError, TraekyResult};
use crate::models::Transaction;

/// Column order of every transaction CSV
pub const CSV_HEADER: [&str; 9] = [
    "id",
    "timestamp",
    "type",
    "asset",
    "amount",
    "price",
    "currency",
    "fee",
    "note",
];

/// Write transactions as CSV, header first
pub fn write_transactions_csv<W: Write>(writer: W, transactions: &[Transaction]) -> TraekyResult<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(CSV_HEADER)?;

    for tx in transactions {
        csv.write_record([
            tx.id.to_string(),
            tx.timestamp.clone(),
            tx.tx_type.clone(),
            tx.asset_symbol.clone(),
            tx.amount.to_string(),
            optional_number(tx.price_fiat),
            tx.fiat_currency.clone(),
            optional_number(tx.fee_fiat),
            tx.note.clone().unwrap_or_default(),
        ])?;
    }

    csv.flush()
        .map_err(|e| TraekyError::Export(format!("Failed to flush CSV: {}", e)))
}

/// Render transactions to an in-memory CSV document
pub fn transactions_to_csv_string(transactions: &[Transaction]) -> TraekyResult<String> {
    let mut buffer = Vec::new();
    write_transactions_csv(&mut buffer, transactions)?;
    String::from_utf8(buffer).map_err(|e| TraekyError::Export(e.to_string()))
}

/// File name for a safety-net backup of one profile
pub fn backup_file_name(profile_label: &str, at: DateTime<Utc>) -> String {
    let slug: String = profile_label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug.trim_matches('-');
    let slug = if slug.is_empty() { "profile" } else { slug };
    format!("traeky-backup-{}-{}.csv", slug, at.format("%Y%m%d-%H%M%S"))
}

fn optional_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
