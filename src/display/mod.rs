//! Display formatting for terminal output
//!
//! Plain-text tables for profiles, transactions and sync status.

pub mod profile;
pub mod status;
pub mod transaction;

pub use profile::{format_profile_details, format_profile_list};
pub use status::format_sync_status;
pub use transaction::{format_transaction_register, format_transaction_row};
