//! Export functionality for Traeky
//!
//! Plain-text CSV rendering of transactions.

pub mod csv;

pub use self::csv::{
    backup_file_name, transactions_to_csv_string, write_transactions_csv, CSV_HEADER,
};
