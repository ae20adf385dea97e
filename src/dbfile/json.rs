//! JSON text encoding of the portable database
//!
//! Writing uses the serde shape of [`VaultDatabase`]. Reading walks the raw
//! JSON value instead, so one malformed profile or payload is skipped rather
//! than failing the whole file.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{TraekyError, TraekyResult};
use crate::models::{
    DbMeta, EncryptedPayload, EncryptionScope, Profile, ProfileId, ProfileIndex, UiSettings,
    VaultDatabase, DB_FORMAT_VERSION,
};

use super::parse_timestamp;

pub fn serialize(db: &VaultDatabase) -> TraekyResult<Vec<u8>> {
    Ok(serde_json::to_vec_pretty(db)?)
}

pub fn deserialize(bytes: &[u8], fallback_lang: &str) -> TraekyResult<VaultDatabase> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| TraekyError::UnsupportedFormat(format!("invalid JSON: {}", e)))?;
    from_value(&value, fallback_lang)
}

/// Read a database from an already parsed JSON document
pub(crate) fn from_value(value: &Value, fallback_lang: &str) -> TraekyResult<VaultDatabase> {
    let root = value
        .as_object()
        .ok_or_else(|| TraekyError::UnsupportedFormat("top level is not an object".into()))?;

    match root.get("version").and_then(Value::as_u64) {
        Some(v) if v == u64::from(DB_FORMAT_VERSION) => {}
        Some(v) => {
            return Err(TraekyError::UnsupportedFormat(format!(
                "database format version {}",
                v
            )))
        }
        None => {
            return Err(TraekyError::UnsupportedFormat(
                "missing database format version".into(),
            ))
        }
    }

    let created_at = timestamp_field(root, "createdAt").unwrap_or_else(Utc::now);
    let updated_at = timestamp_field(root, "updatedAt").unwrap_or(created_at);

    let index = root
        .get("index")
        .and_then(Value::as_object)
        .map(|index| parse_index(index, created_at))
        .unwrap_or_default();

    let profile_data = root
        .get("profileData")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(id, raw)| match parse_payload(raw) {
                    Some(payload) => Some((ProfileId::from(id.as_str()), payload)),
                    None => {
                        tracing::warn!(target: "traeky", event = "payload_skipped", profile_id = %id);
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let ui = root.get("ui").and_then(Value::as_object);
    let ui = UiSettings {
        lang: ui
            .and_then(|u| u.get("lang"))
            .and_then(Value::as_str)
            .unwrap_or(fallback_lang)
            .to_string(),
        mode: ui
            .and_then(|u| u.get("mode"))
            .and_then(Value::as_str)
            .unwrap_or("light")
            .to_string(),
    };

    let revision = root
        .get("meta")
        .and_then(|m| m.get("revision"))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    Ok(VaultDatabase {
        format_version: DB_FORMAT_VERSION,
        created_at,
        updated_at,
        index,
        profile_data,
        ui,
        meta: DbMeta { revision },
    })
}

fn timestamp_field(object: &Map<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    match object.get(key)? {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => parse_timestamp(&n.to_string()),
        _ => None,
    }
}

pub(crate) fn parse_index(index: &Map<String, Value>, default_time: DateTime<Utc>) -> ProfileIndex {
    let profiles = index
        .get("profiles")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let profile = parse_profile(item, default_time);
                    if profile.is_none() {
                        tracing::warn!(target: "traeky", event = "profile_skipped");
                    }
                    profile
                })
                .collect()
        })
        .unwrap_or_default();

    let mut index = ProfileIndex {
        current_profile_id: index
            .get("currentProfileId")
            .and_then(Value::as_str)
            .map(ProfileId::from),
        profiles,
    };
    index.repair_current();
    index
}

fn parse_profile(raw: &Value, default_time: DateTime<Utc>) -> Option<Profile> {
    let object = raw.as_object()?;
    let id = object.get("id")?.as_str()?;
    let name = object.get("name")?.as_str()?;
    let created_at = timestamp_field(object, "createdAt").unwrap_or(default_time);
    let updated_at = timestamp_field(object, "updatedAt").unwrap_or(created_at);
    Some(Profile {
        id: ProfileId::from(id),
        name: name.to_string(),
        created_at,
        updated_at,
    })
}

pub(crate) fn parse_payload(raw: &Value) -> Option<EncryptedPayload> {
    let object = raw.as_object()?;
    let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
    Some(EncryptedPayload {
        version: u32::try_from(object.get("version")?.as_u64()?).ok()?,
        algorithm: text("algorithm")?,
        salt: text("salt")?,
        iv: text("iv")?,
        ciphertext: text("ciphertext")?,
        scope: object
            .get("scope")
            .and_then(Value::as_str)
            .and_then(EncryptionScope::parse),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbfile::fixtures::sample_db;
    use serde_json::json;

    fn parse(value: Value) -> TraekyResult<VaultDatabase> {
        deserialize(&serde_json::to_vec(&value).unwrap(), "fr")
    }

    #[test]
    fn test_wrong_version_is_unsupported() {
        let result = parse(json!({"version": 2, "index": {}, "profileData": {}}));
        assert!(matches!(result, Err(TraekyError::UnsupportedFormat(_))));

        let result = parse(json!({"index": {}}));
        assert!(matches!(result, Err(TraekyError::UnsupportedFormat(_))));

        let result = parse(json!([1, 2, 3]));
        assert!(matches!(result, Err(TraekyError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let db = parse(json!({"version": 1})).unwrap();
        assert_eq!(db.ui, UiSettings { lang: "fr".into(), mode: "light".into() });
        assert_eq!(db.revision(), 0);
        assert!(db.index.is_empty());
        assert!(db.profile_data.is_empty());
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let db = parse(json!({
            "version": 1,
            "index": {
                "currentProfileId": "gone",
                "profiles": [
                    {"id": "p1", "name": "Alice"},
                    {"id": 42, "name": "Broken"},
                    "not even an object"
                ]
            },
            "profileData": {
                "p1": {"version": 1, "algorithm": "AES-GCM", "salt": "cw==", "iv": "aQ==",
                       "ciphertext": "Yw==", "scope": "mystery"},
                "p2": {"algorithm": "AES-GCM"}
            },
            "meta": {"revision": 9}
        }))
        .unwrap();

        assert_eq!(db.profiles().len(), 1);
        assert_eq!(db.index.current_profile_id, Some(ProfileId::from("p1")));
        assert_eq!(db.profile_data.len(), 1);
        assert_eq!(db.payload("p1").unwrap().scope, None);
        assert_eq!(db.revision(), 9);
    }

    #[test]
    fn test_round_trip() {
        let db = sample_db();
        let bytes = serialize(&db).unwrap();
        assert_eq!(deserialize(&bytes, "en").unwrap(), db);
    }
}
