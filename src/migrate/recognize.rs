//! Structural recognition of legacy storage values
//!
//! The oldest layouts carry no version tags, so every stored value is run
//! through an ordered chain of recognizers and takes the first shape that
//! matches. The order matters where shapes overlap: a whole snapshot also
//! contains payloads, and a profile data object keyed `...config` is still
//! profile data.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;

use crate::dbfile::json::{from_value, parse_index, parse_payload};
use crate::models::{
    AppConfig, EncryptedPayload, ProfileDataPayload, ProfileIndex, Transaction, VaultDatabase,
    DB_FORMAT_VERSION, PAYLOAD_ALGORITHM,
};

/// A legacy value whose structure was recognized
#[derive(Debug, Clone, PartialEq)]
pub enum LegacyShape {
    /// A whole database, as exported or snapshotted by an earlier version
    DatabaseSnapshot(VaultDatabase),
    /// Multi-profile index from the localStorage layout
    ProfilesIndex(ProfileIndex),
    /// A single encrypted blob, owner unknown
    EncryptedPayload(EncryptedPayload),
    /// Profile id → encrypted blob
    PayloadMap(BTreeMap<String, EncryptedPayload>),
    /// Profile id → PIN hash
    PinHashMap(BTreeMap<String, String>),
    /// Unencrypted profile data of the implicit single profile
    PlainProfileData(ProfileDataPayload),
    /// Bare transaction list of the implicit single profile
    TransactionList(Vec<Transaction>),
    /// Stand-alone app configuration
    AppConfig(AppConfig),
}

impl LegacyShape {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DatabaseSnapshot(_) => "database_snapshot",
            Self::ProfilesIndex(_) => "profiles_index",
            Self::EncryptedPayload(_) => "encrypted_payload",
            Self::PayloadMap(_) => "payload_map",
            Self::PinHashMap(_) => "pin_hash_map",
            Self::PlainProfileData(_) => "plain_profile_data",
            Self::TransactionList(_) => "transaction_list",
            Self::AppConfig(_) => "app_config",
        }
    }
}

type Recognizer = fn(&str, &Value) -> Option<LegacyShape>;

/// The recognizer chain, in trial order
const RECOGNIZERS: [Recognizer; 8] = [
    database_snapshot,
    profiles_index,
    encrypted_payload,
    payload_map,
    pin_hash_map,
    plain_profile_data,
    transaction_list,
    app_config,
];

/// First matching shape for a stored value, or `None` if nothing matches
pub fn recognize(key: &str, value: &Value) -> Option<LegacyShape> {
    RECOGNIZERS.iter().find_map(|recognizer| recognizer(key, value))
}

/// Values that may arrive double-encoded as a JSON string
fn unwrap_text(value: &Value) -> Option<Value> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                serde_json::from_str(text).ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Normalize a raw value, then recognize it
pub fn recognize_raw(key: &str, value: &Value) -> Option<LegacyShape> {
    match unwrap_text(value) {
        Some(inner) => recognize(key, &inner),
        None => recognize(key, value),
    }
}

fn database_snapshot(_key: &str, value: &Value) -> Option<LegacyShape> {
    let object = value.as_object()?;
    let version_matches = object.get("version").and_then(Value::as_u64)
        == Some(u64::from(DB_FORMAT_VERSION));
    if !version_matches
        || !object.get("index").is_some_and(Value::is_object)
        || !object.get("profileData").is_some_and(Value::is_object)
    {
        return None;
    }
    from_value(value, "en").ok().map(LegacyShape::DatabaseSnapshot)
}

fn profiles_index(_key: &str, value: &Value) -> Option<LegacyShape> {
    let object = value.as_object()?;
    let profiles = object.get("profiles")?.as_array()?;
    if profiles.is_empty() {
        return None;
    }
    let all_named = profiles.iter().all(|p| {
        p.get("id").is_some_and(Value::is_string) && p.get("name").is_some_and(Value::is_string)
    });
    if !all_named {
        return None;
    }
    Some(LegacyShape::ProfilesIndex(parse_index(object, Utc::now())))
}

const PAYLOAD_FIELDS: [&str; 5] = ["version", "algorithm", "salt", "iv", "ciphertext"];

fn as_payload(value: &Value) -> Option<EncryptedPayload> {
    let object = value.as_object()?;
    let has_all = PAYLOAD_FIELDS.iter().all(|f| object.contains_key(*f));
    let nothing_else = object
        .keys()
        .all(|k| PAYLOAD_FIELDS.contains(&k.as_str()) || k == "scope");
    if !has_all || !nothing_else {
        return None;
    }
    if object.get("algorithm").and_then(Value::as_str) != Some(PAYLOAD_ALGORITHM) {
        return None;
    }
    parse_payload(value)
}

fn encrypted_payload(_key: &str, value: &Value) -> Option<LegacyShape> {
    as_payload(value).map(LegacyShape::EncryptedPayload)
}

fn payload_map(_key: &str, value: &Value) -> Option<LegacyShape> {
    let object = value.as_object()?;
    if object.is_empty() {
        return None;
    }
    object
        .iter()
        .map(|(id, raw)| as_payload(raw).map(|payload| (id.clone(), payload)))
        .collect::<Option<BTreeMap<_, _>>>()
        .map(LegacyShape::PayloadMap)
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn pin_hash_map(_key: &str, value: &Value) -> Option<LegacyShape> {
    let object = value.as_object()?;
    if object.is_empty() {
        return None;
    }
    object
        .iter()
        .map(|(id, raw)| {
            raw.as_str()
                .filter(|h| is_sha256_hex(h))
                .map(|h| (id.clone(), h.to_ascii_lowercase()))
        })
        .collect::<Option<BTreeMap<_, _>>>()
        .map(LegacyShape::PinHashMap)
}

fn plain_profile_data(_key: &str, value: &Value) -> Option<LegacyShape> {
    let object = value.as_object()?;
    if !object.get("transactions").is_some_and(Value::is_array) {
        return None;
    }
    ProfileDataPayload::from_value_lenient(value.clone()).map(LegacyShape::PlainProfileData)
}

fn looks_like_transaction(item: &Value) -> bool {
    item.as_object()
        .is_some_and(|o| o.contains_key("asset_symbol") && o.contains_key("amount"))
}

fn transaction_list(_key: &str, value: &Value) -> Option<LegacyShape> {
    let items = value.as_array()?;
    if items.is_empty() || !items.iter().all(looks_like_transaction) {
        return None;
    }
    let data = ProfileDataPayload::from_value_lenient(value.clone())?;
    if data.transactions.is_empty() {
        return None;
    }
    Some(LegacyShape::TransactionList(data.transactions))
}

fn app_config(key: &str, value: &Value) -> Option<LegacyShape> {
    if !key.to_ascii_lowercase().ends_with("config") || !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone())
        .ok()
        .map(LegacyShape::AppConfig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_json() -> Value {
        json!({
            "version": 1,
            "algorithm": "AES-GCM",
            "salt": "c2FsdA==",
            "iv": "aXY=",
            "ciphertext": "Y3Q="
        })
    }

    const HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_encrypted_payload_needs_exact_fields() {
        assert!(matches!(
            recognize("k", &payload_json()),
            Some(LegacyShape::EncryptedPayload(_))
        ));

        let mut tagged = payload_json();
        tagged["scope"] = json!("legacy-appkey");
        assert!(matches!(
            recognize("k", &tagged),
            Some(LegacyShape::EncryptedPayload(_))
        ));

        let mut extra = payload_json();
        extra["owner"] = json!("someone");
        assert!(recognize("k", &extra).is_none());

        let mut other_algorithm = payload_json();
        other_algorithm["algorithm"] = json!("AES-CBC");
        assert!(recognize("k", &other_algorithm).is_none());
    }

    #[test]
    fn test_payload_map_after_single_payload() {
        let map = json!({ "p1": payload_json(), "p2": payload_json() });
        match recognize("traeky:profile-data", &map) {
            Some(LegacyShape::PayloadMap(entries)) => {
                assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["p1", "p2"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mixed = json!({ "p1": payload_json(), "p2": "nope" });
        assert!(recognize("k", &mixed).is_none());
    }

    #[test]
    fn test_profiles_index() {
        let index = json!({
            "currentProfileId": "p2",
            "profiles": [{"id": "p1", "name": "A"}, {"id": "p2", "name": "B"}]
        });
        match recognize("traeky:profiles:index", &index) {
            Some(LegacyShape::ProfilesIndex(index)) => {
                assert_eq!(index.profiles.len(), 2);
                assert_eq!(index.current_profile_id.as_ref().unwrap().as_str(), "p2");
            }
            other => panic!("unexpected {:?}", other),
        }

        assert!(recognize("k", &json!({"profiles": []})).is_none());
        assert!(recognize("k", &json!({"profiles": [{"id": "p1"}]})).is_none());
    }

    #[test]
    fn test_snapshot_before_index() {
        let snapshot = json!({
            "version": 1,
            "index": {"profiles": [{"id": "p1", "name": "A"}]},
            "profileData": {"p1": payload_json()},
            "meta": {"revision": 7}
        });
        match recognize("backup", &snapshot) {
            Some(LegacyShape::DatabaseSnapshot(db)) => {
                assert_eq!(db.revision(), 7);
                assert!(db.payload("p1").is_some());
            }
            other => panic!("unexpected {:?}", other),
        }

        let wrong_version = json!({"version": 9, "index": {}, "profileData": {}});
        assert!(recognize("backup", &wrong_version).is_none());
    }

    #[test]
    fn test_pin_hash_map() {
        match recognize("traeky:pins", &json!({ "p1": HASH })) {
            Some(LegacyShape::PinHashMap(map)) => assert_eq!(map["p1"], HASH),
            other => panic!("unexpected {:?}", other),
        }
        assert!(recognize("traeky:pins", &json!({ "p1": "1234" })).is_none());
    }

    #[test]
    fn test_profile_data_wins_over_config_key() {
        let value = json!({
            "transactions": [{"id": 1, "asset_symbol": "BTC", "tx_type": "BUY", "amount": 1.0}],
            "base_currency": "USD"
        });
        assert!(matches!(
            recognize("traeky:config", &value),
            Some(LegacyShape::PlainProfileData(_))
        ));
    }

    #[test]
    fn test_transaction_list_and_config() {
        let txs = json!([
            {"id": 1, "asset_symbol": "BTC", "tx_type": "BUY", "amount": 1.0},
            {"id": 2, "asset_symbol": "ETH", "tx_type": "SELL", "amount": 2.0}
        ]);
        match recognize("transactions", &txs) {
            Some(LegacyShape::TransactionList(list)) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
        assert!(recognize("numbers", &json!([1, 2, 3])).is_none());

        let config = json!({"base_currency": "USD"});
        match recognize("app_config", &config) {
            Some(LegacyShape::AppConfig(c)) => assert_eq!(c.base_currency, "USD"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(recognize("settings", &config).is_none());
    }

    #[test]
    fn test_double_encoded_value() {
        let text = Value::String(payload_json().to_string());
        assert!(matches!(
            recognize_raw("k", &text),
            Some(LegacyShape::EncryptedPayload(_))
        ));
        assert!(recognize_raw("k", &json!("plain words")).is_none());
    }
}
