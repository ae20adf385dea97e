//! Transaction display formatting
//!
//! Register view of a profile's transactions for the terminal.

use crate::models::Transaction;

/// Format a single transaction as a register row
pub fn format_transaction_row(tx: &Transaction) -> String {
    let date = tx.timestamp.get(..10).unwrap_or(&tx.timestamp);
    let value = tx
        .fiat_value()
        .map(|v| format!("{:.2} {}", v, tx.fiat_currency))
        .unwrap_or_default();

    format!(
        "{:>5} {:10} {:12} {:8} {:>16} {:>16}",
        tx.id,
        date,
        truncate(&tx.tx_type, 12),
        truncate(&tx.asset_symbol, 8),
        tx.amount,
        value
    )
}

/// Format a list of transactions as a register
pub fn format_transaction_register(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return "No transactions found.\n".to_string();
    }

    let mut output = String::new();
    output.push_str(&format!(
        "{:>5} {:10} {:12} {:8} {:>16} {:>16}\n",
        "Id", "Date", "Type", "Asset", "Amount", "Value"
    ));
    output.push_str(&"-".repeat(72));
    output.push('\n');

    for tx in transactions {
        output.push_str(&format_transaction_row(tx));
        output.push('\n');
    }

    output
}

/// Pad or shorten a string to exactly `max_len` characters
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TxType;

    #[test]
    fn test_format_transaction_row() {
        let mut tx = Transaction::new(12, "BTC", TxType::Buy, 0.5);
        tx.timestamp = "2025-01-15T09:30:00Z".into();
        tx.price_fiat = Some(40000.0);
        tx.fiat_currency = "EUR".into();

        let formatted = format_transaction_row(&tx);
        assert!(formatted.contains("2025-01-15"));
        assert!(!formatted.contains("09:30"));
        assert!(formatted.contains("BUY"));
        assert!(formatted.contains("20000.00 EUR"));
    }

    #[test]
    fn test_format_empty_register() {
        let formatted = format_transaction_register(&[]);
        assert!(formatted.contains("No transactions found"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Short", 10).trim(), "Short");
        let result = truncate("TRANSFER_OUT_EXTENDED", 12);
        assert_eq!(result.chars().count(), 12);
        assert!(result.ends_with("..."));
    }
}
