//! Plaintext profile payload
//!
//! Everything one profile owns: its transactions, the transaction id counter,
//! app configuration and optional price caches. This is the value that gets
//! JSON-serialized and encrypted into an [`super::EncryptedPayload`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::transaction::Transaction;

/// Current plaintext payload version
pub const PROFILE_DATA_VERSION: u32 = 1;

/// Per-profile application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// Days after which a holding counts as long-term
    #[serde(default = "default_holding_period_days")]
    pub holding_period_days: u32,

    /// Window for "becomes long-term soon" hints
    #[serde(default = "default_upcoming_window_days")]
    pub upcoming_holding_window_days: u32,

    #[serde(default = "default_true")]
    pub price_fetch_enabled: bool,

    /// Settings owned by the UI that the vault passes through
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_base_currency() -> String {
    "EUR".to_string()
}

fn default_holding_period_days() -> u32 {
    365
}

fn default_upcoming_window_days() -> u32 {
    30
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            holding_period_days: default_holding_period_days(),
            upcoming_holding_window_days: default_upcoming_window_days(),
            price_fetch_enabled: true,
            extra: Map::new(),
        }
    }
}

fn default_version() -> u32 {
    PROFILE_DATA_VERSION
}

fn default_next_id() -> u64 {
    1
}

/// The decrypted contents of one profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDataPayload {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub transactions: Vec<Transaction>,

    /// Strictly greater than every id ever handed out in this profile
    #[serde(default = "default_next_id")]
    pub next_transaction_id: u64,

    #[serde(default)]
    pub config: AppConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_cache: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_price_cache: Option<Value>,
}

impl Default for ProfileDataPayload {
    fn default() -> Self {
        Self {
            version: PROFILE_DATA_VERSION,
            transactions: Vec::new(),
            next_transaction_id: 1,
            config: AppConfig::default(),
            price_cache: None,
            historical_price_cache: None,
        }
    }
}

impl ProfileDataPayload {
    /// Highest transaction id currently present
    pub fn max_transaction_id(&self) -> Option<u64> {
        self.transactions.iter().map(|t| t.id).max()
    }

    /// Raise the counter above every present id; never lowers it
    pub fn repair_counter(&mut self) {
        if let Some(max) = self.max_transaction_id() {
            if self.next_transaction_id <= max {
                self.next_transaction_id = max + 1;
            }
        }
        if self.next_transaction_id == 0 {
            self.next_transaction_id = 1;
        }
    }

    /// Hand out the next transaction id and advance the counter
    pub fn take_next_id(&mut self) -> u64 {
        self.repair_counter();
        let id = self.next_transaction_id;
        self.next_transaction_id += 1;
        id
    }

    /// Build a payload from decrypted or legacy plaintext
    ///
    /// Accepts the payload object itself or a bare transaction array (the
    /// oldest single-profile layout). Transactions that do not parse are
    /// skipped. Returns `None` for any other shape.
    pub fn from_value_lenient(value: Value) -> Option<Self> {
        match value {
            Value::Array(items) => {
                let mut data = Self {
                    transactions: parse_transactions(items),
                    ..Self::default()
                };
                data.repair_counter();
                Some(data)
            }
            Value::Object(mut map) => {
                let transactions = match map.remove("transactions") {
                    Some(Value::Array(items)) => parse_transactions(items),
                    _ => Vec::new(),
                };
                let mut data: Self = serde_json::from_value(Value::Object(map)).ok()?;
                data.transactions = transactions;
                data.repair_counter();
                Some(data)
            }
            _ => None,
        }
    }
}

fn parse_transactions(items: Vec<Value>) -> Vec<Transaction> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(tx) => Some(tx),
            Err(e) => {
                tracing::warn!(target: "traeky", event = "transaction_skipped", error = %e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::transaction::TxType;
    use serde_json::json;

    #[test]
    fn test_ids_never_reused_after_delete() {
        let mut data = ProfileDataPayload::default();
        let a = data.take_next_id();
        let b = data.take_next_id();
        data.transactions.push(Transaction::new(a, "BTC", TxType::Buy, 1.0));
        data.transactions.push(Transaction::new(b, "BTC", TxType::Buy, 1.0));

        data.transactions.retain(|t| t.id != b);
        let c = data.take_next_id();

        assert!(a < b && b < c);
    }

    #[test]
    fn test_repair_counter_raises_only() {
        let mut data = ProfileDataPayload::default();
        data.transactions.push(Transaction::new(41, "BTC", TxType::Buy, 1.0));
        data.repair_counter();
        assert_eq!(data.next_transaction_id, 42);

        data.next_transaction_id = 100;
        data.repair_counter();
        assert_eq!(data.next_transaction_id, 100);
    }

    #[test]
    fn test_defaults_for_missing_fields() {
        let data: ProfileDataPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(data.next_transaction_id, 1);
        assert_eq!(data.config.base_currency, "EUR");
        assert!(data.transactions.is_empty());
    }

    #[test]
    fn test_lenient_from_bare_array() {
        let raw = json!([
            {"id": 3, "asset_symbol": "BTC", "tx_type": "BUY", "amount": 1.0},
            {"garbage": true}
        ]);
        let data = ProfileDataPayload::from_value_lenient(raw).unwrap();
        assert_eq!(data.transactions.len(), 1);
        assert_eq!(data.next_transaction_id, 4);
    }

    #[test]
    fn test_lenient_from_object_keeps_config() {
        let raw = json!({
            "transactions": [{"id": 1, "asset_symbol": "ETH", "tx_type": "SELL", "amount": 2.0}],
            "nextTransactionId": 10,
            "config": {"base_currency": "USD"}
        });
        let data = ProfileDataPayload::from_value_lenient(raw).unwrap();
        assert_eq!(data.next_transaction_id, 10);
        assert_eq!(data.config.base_currency, "USD");
        assert!(ProfileDataPayload::from_value_lenient(json!("text")).is_none());
    }

    #[test]
    fn test_camel_case_shape() {
        let json = serde_json::to_value(ProfileDataPayload::default()).unwrap();
        assert!(json.get("nextTransactionId").is_some());
        assert!(json.get("priceCache").is_none());
    }
}
