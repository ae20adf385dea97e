//! SQLite encoding of the portable database
//!
//! The database is built in memory and serialized to bytes, and read back by
//! deserializing bytes into an in-memory connection. Tables:
//!
//! - `meta(key, value)`: format_version, created_at, updated_at, revision,
//!   current_profile_id
//! - `ui_settings(id = 1, lang, mode)`
//! - `profiles(id, name, created_at, updated_at)`, in index order
//! - `profile_data(profile_id, ...)` referencing `profiles` with cascading delete

use std::collections::{BTreeMap, HashMap};
use std::ptr::NonNull;

use chrono::{DateTime, Utc};
use rusqlite::serialize::OwnedData;
use rusqlite::{params, Connection, DatabaseName, OptionalExtension, Row};

use crate::error::{TraekyError, TraekyResult};
use crate::models::{
    DbMeta, EncryptedPayload, EncryptionScope, Profile, ProfileId, ProfileIndex, UiSettings,
    VaultDatabase, DB_FORMAT_VERSION,
};

use super::{format_timestamp, parse_timestamp};

const SCHEMA: &str = "
    CREATE TABLE meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE ui_settings (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        lang TEXT NOT NULL,
        mode TEXT NOT NULL
    );
    CREATE TABLE profiles (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE profile_data (
        profile_id TEXT PRIMARY KEY REFERENCES profiles(id) ON DELETE CASCADE,
        version INTEGER NOT NULL,
        algorithm TEXT NOT NULL,
        salt TEXT NOT NULL,
        iv TEXT NOT NULL,
        ciphertext TEXT NOT NULL,
        scope TEXT,
        updated_at TEXT NOT NULL
    );
";

pub fn serialize(db: &VaultDatabase) -> TraekyResult<Vec<u8>> {
    let mut conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;

    let tx = conn.transaction()?;
    {
        let mut meta = tx.prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")?;
        meta.execute(params!["format_version", db.format_version.to_string()])?;
        meta.execute(params!["created_at", format_timestamp(&db.created_at)])?;
        meta.execute(params!["updated_at", format_timestamp(&db.updated_at)])?;
        meta.execute(params!["revision", db.meta.revision.to_string()])?;
        if let Some(current) = &db.index.current_profile_id {
            meta.execute(params!["current_profile_id", current.as_str()])?;
        }

        tx.execute(
            "INSERT INTO ui_settings (id, lang, mode) VALUES (1, ?1, ?2)",
            params![db.ui.lang, db.ui.mode],
        )?;

        let mut profiles = tx.prepare(
            "INSERT INTO profiles (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )?;
        let mut data = tx.prepare(
            "INSERT INTO profile_data
                (profile_id, version, algorithm, salt, iv, ciphertext, scope, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for profile in db.profiles() {
            profiles.execute(params![
                profile.id.as_str(),
                profile.name,
                format_timestamp(&profile.created_at),
                format_timestamp(&profile.updated_at),
            ])?;
            if let Some(payload) = db.payload(profile.id.as_str()) {
                data.execute(params![
                    profile.id.as_str(),
                    payload.version,
                    payload.algorithm,
                    payload.salt,
                    payload.iv,
                    payload.ciphertext,
                    payload.scope.map(|s| s.as_str()),
                    format_timestamp(&profile.updated_at),
                ])?;
            }
        }
    }
    tx.commit()?;

    let data = conn.serialize(DatabaseName::Main)?;
    Ok(data.as_ref().to_vec())
}

pub fn deserialize(bytes: &[u8], fallback_lang: &str) -> TraekyResult<VaultDatabase> {
    let mut conn = Connection::open_in_memory()?;
    conn.deserialize(DatabaseName::Main, owned_data_from_bytes(bytes)?, false)
        .map_err(|e| TraekyError::UnsupportedFormat(format!("unreadable SQLite file: {}", e)))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let meta = read_meta(&conn)?;
    match meta.get("format_version").map(|v| v.parse::<u32>()) {
        Some(Ok(v)) if v == DB_FORMAT_VERSION => {}
        Some(_) => {
            return Err(TraekyError::UnsupportedFormat(format!(
                "database format version {}",
                meta["format_version"]
            )))
        }
        None => {
            return Err(TraekyError::UnsupportedFormat(
                "missing database format version".into(),
            ))
        }
    }

    let created_at = meta
        .get("created_at")
        .and_then(|v| parse_timestamp(v))
        .unwrap_or_else(Utc::now);
    let updated_at = meta
        .get("updated_at")
        .and_then(|v| parse_timestamp(v))
        .unwrap_or(created_at);
    let revision = meta
        .get("revision")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);

    let ui = read_ui(&conn).unwrap_or_else(|| UiSettings::new(fallback_lang));
    let profiles = read_profiles(&conn, created_at)?;
    let profile_data = read_profile_data(&conn)?;

    let mut index = ProfileIndex {
        current_profile_id: meta.get("current_profile_id").map(|id| ProfileId::from(id.as_str())),
        profiles,
    };
    index.repair_current();

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

fn read_meta(conn: &Connection) -> TraekyResult<HashMap<String, String>> {
    let mut stmt = conn
        .prepare("SELECT key, value FROM meta")
        .map_err(|e| TraekyError::UnsupportedFormat(format!("missing meta table: {}", e)))?;
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut meta = HashMap::new();
    for row in rows {
        match row {
            Ok((key, value)) => {
                meta.insert(key, value);
            }
            Err(e) => tracing::warn!(target: "traeky", event = "meta_row_skipped", error = %e),
        }
    }
    Ok(meta)
}

fn read_ui(conn: &Connection) -> Option<UiSettings> {
    let row = conn
        .query_row(
            "SELECT lang, mode FROM ui_settings WHERE id = 1",
            [],
            |row| Ok((text(row, 0), text(row, 1))),
        )
        .optional();
    match row {
        Ok(Some((Some(lang), mode))) => Some(UiSettings {
            lang,
            mode: mode.unwrap_or_else(|| "light".to_string()),
        }),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(target: "traeky", event = "ui_settings_unreadable", error = %e);
            None
        }
    }
}

fn read_profiles(conn: &Connection, default_time: DateTime<Utc>) -> TraekyResult<Vec<Profile>> {
    let mut stmt = conn
        .prepare("SELECT id, name, created_at, updated_at FROM profiles ORDER BY rowid")
        .map_err(|e| TraekyError::UnsupportedFormat(format!("missing profiles table: {}", e)))?;
    let rows = stmt.query_map([], |row| {
        Ok((text(row, 0), text(row, 1), text(row, 2), text(row, 3)))
    })?;

    let mut profiles = Vec::new();
    for row in rows {
        match row? {
            (Some(id), Some(name), created, updated) => {
                let created_at = created
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or(default_time);
                let updated_at = updated
                    .as_deref()
                    .and_then(parse_timestamp)
                    .unwrap_or(created_at);
                profiles.push(Profile {
                    id: ProfileId::from(id),
                    name,
                    created_at,
                    updated_at,
                });
            }
            _ => tracing::warn!(target: "traeky", event = "profile_skipped"),
        }
    }
    Ok(profiles)
}

fn read_profile_data(conn: &Connection) -> TraekyResult<BTreeMap<ProfileId, EncryptedPayload>> {
    let mut stmt = conn
        .prepare(
            "SELECT profile_id, version, algorithm, salt, iv, ciphertext, scope FROM profile_data",
        )
        .map_err(|e| {
            TraekyError::UnsupportedFormat(format!("missing profile_data table: {}", e))
        })?;
    let rows = stmt.query_map([], |row| {
        let version = row
            .get::<_, i64>(1)
            .ok()
            .and_then(|v| u32::try_from(v).ok());
        Ok((
            text(row, 0),
            version,
            text(row, 2),
            text(row, 3),
            text(row, 4),
            text(row, 5),
            text(row, 6),
        ))
    })?;

    let mut data = BTreeMap::new();
    for row in rows {
        match row? {
            (Some(id), Some(version), Some(algorithm), Some(salt), Some(iv), Some(ciphertext), scope) => {
                data.insert(
                    ProfileId::from(id),
                    EncryptedPayload {
                        version,
                        algorithm,
                        salt,
                        iv,
                        ciphertext,
                        scope: scope.as_deref().and_then(EncryptionScope::parse),
                    },
                );
            }
            (id, ..) => {
                tracing::warn!(target: "traeky", event = "payload_skipped", profile_id = ?id)
            }
        }
    }
    Ok(data)
}

/// Text column, or `None` for NULL or a non-text value
fn text(row: &Row<'_>, idx: usize) -> Option<String> {
    row.get::<_, Option<String>>(idx).ok().flatten()
}

fn owned_data_from_bytes(bytes: &[u8]) -> TraekyResult<OwnedData> {
    if bytes.is_empty() {
        return Err(TraekyError::UnsupportedFormat("empty database file".into()));
    }

    let size: i32 = bytes
        .len()
        .try_into()
        .map_err(|_| TraekyError::UnsupportedFormat("database file too large".into()))?;
    // SAFETY: sqlite3_malloc returns either null or a pointer to `size`
    // writable bytes. Null is rejected just below, and `size` was checked to
    // fit in an i32.
    let raw = unsafe { rusqlite::ffi::sqlite3_malloc(size) as *mut u8 };
    let ptr = NonNull::new(raw)
        .ok_or_else(|| TraekyError::Sqlite("SQLite allocation failed".into()))?;

    // SAFETY:
    // - `ptr` is non-null and writable for `bytes.len()` bytes, since it was
    //   allocated above with exactly that size
    // - `bytes` is valid for reads of `bytes.len()` bytes
    // - the regions cannot overlap because `ptr` is a fresh allocation
    // - `OwnedData` takes over the sqlite3_malloc buffer and SQLite frees it
    //   once the data is dropped or deserialized
    unsafe {
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.as_ptr(), bytes.len());
        Ok(OwnedData::from_raw_nonnull(ptr, bytes.len()))
    }
}
