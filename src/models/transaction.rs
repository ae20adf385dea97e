//! Transaction model
//!
//! A single portfolio transaction as stored inside a profile's encrypted
//! payload. Fields the vault does not interpret are preserved in `extra`, so
//! data written by a newer UI survives a round trip through this crate.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Kind of portfolio movement
///
/// Stored as its upper-case tag so that tags this crate does not know about
/// still round-trip unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Buy,
    Sell,
    TransferIn,
    TransferOut,
    Reward,
    Fee,
    Other,
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::TransferIn => "TRANSFER_IN",
            Self::TransferOut => "TRANSFER_OUT",
            Self::Reward => "REWARD",
            Self::Fee => "FEE",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TxType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "TRANSFER_IN" => Ok(Self::TransferIn),
            "TRANSFER_OUT" => Ok(Self::TransferOut),
            "REWARD" => Ok(Self::Reward),
            "FEE" => Ok(Self::Fee),
            other => Err(format!("unknown transaction type: {}", other)),
        }
    }
}

/// A portfolio transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Profile-local id, never reused
    pub id: u64,

    pub asset_symbol: String,

    /// Upper-case type tag, see [`TxType`]
    pub tx_type: String,

    /// Quantity of the asset (always positive; direction comes from `tx_type`)
    pub amount: f64,

    /// Unit price in `fiat_currency`
    #[serde(default)]
    pub price_fiat: Option<f64>,

    #[serde(default)]
    pub fiat_currency: String,

    /// RFC 3339 timestamp as entered by the user
    #[serde(default)]
    pub timestamp: String,

    #[serde(default)]
    pub fee_fiat: Option<f64>,

    #[serde(default)]
    pub note: Option<String>,

    /// Unrecognized fields carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    /// Create a transaction with the required fields
    pub fn new(id: u64, asset_symbol: impl Into<String>, tx_type: TxType, amount: f64) -> Self {
        Self {
            id,
            asset_symbol: asset_symbol.into(),
            tx_type: tx_type.to_string(),
            amount,
            price_fiat: None,
            fiat_currency: String::new(),
            timestamp: String::new(),
            fee_fiat: None,
            note: None,
            extra: Map::new(),
        }
    }

    /// Parsed type tag; unknown tags map to [`TxType::Other`]
    pub fn kind(&self) -> TxType {
        self.tx_type.parse().unwrap_or(TxType::Other)
    }

    /// Total fiat value, if a price is known
    pub fn fiat_value(&self) -> Option<f64> {
        self.price_fiat.map(|p| p * self.amount)
    }
}
