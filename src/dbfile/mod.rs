//! Portable database file
//!
//! Encodes the whole [`VaultDatabase`] as one file the user can carry between
//! devices. Two encodings exist: an embedded SQLite database (written by
//! default) and a JSON document. Reading sniffs the content, so either can be
//! opened regardless of the configured write format.

pub mod json;
pub mod sqlite;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::config::DbFileFormat;
use crate::error::{TraekyError, TraekyResult};
use crate::models::VaultDatabase;

/// Header every SQLite database file starts with
pub const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// Encode a database in the given format
pub fn serialize(db: &VaultDatabase, format: DbFileFormat) -> TraekyResult<Vec<u8>> {
    match format {
        DbFileFormat::Sqlite => sqlite::serialize(db),
        DbFileFormat::Json => json::serialize(db),
    }
}

/// Decode a database file of either format
///
/// `fallback_lang` fills in the UI language when the file has none.
pub fn deserialize(bytes: &[u8], fallback_lang: &str) -> TraekyResult<VaultDatabase> {
    let mut db = match detect_format(bytes)? {
        DbFileFormat::Sqlite => sqlite::deserialize(bytes, fallback_lang)?,
        DbFileFormat::Json => json::deserialize(bytes, fallback_lang)?,
    };
    db.repair();
    Ok(db)
}

/// Tell the two encodings apart by their first bytes
pub fn detect_format(bytes: &[u8]) -> TraekyResult<DbFileFormat> {
    if bytes.starts_with(SQLITE_MAGIC) {
        return Ok(DbFileFormat::Sqlite);
    }
    let text = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match text.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Ok(DbFileFormat::Json),
        _ => Err(TraekyError::UnsupportedFormat(
            "not a Traeky database file".into(),
        )),
    }
}

pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// RFC 3339 text, or milliseconds since the epoch as older writers stored
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Some(at.with_timezone(&Utc));
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"SQLite format 3\0rest").unwrap(), DbFileFormat::Sqlite);
        assert_eq!(detect_format(b"  \n{\"version\":1}").unwrap(), DbFileFormat::Json);
        assert!(matches!(
            detect_format(b"PK\x03\x04"),
            Err(TraekyError::UnsupportedFormat(_))
        ));
        assert!(matches!(detect_format(b""), Err(TraekyError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_round_trip_both_formats() {
        let db = fixtures::sample_db();
        for format in [DbFileFormat::Sqlite, DbFileFormat::Json] {
            let bytes = serialize(&db, format).unwrap();
            assert_eq!(detect_format(&bytes).unwrap(), format);
            assert_eq!(deserialize(&bytes, "en").unwrap(), db);
        }
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let at = parse_timestamp("2024-03-01T12:00:00.250Z").unwrap();
        assert_eq!(format_timestamp(&at), "2024-03-01T12:00:00.250Z");
        let from_ms = parse_timestamp("1709294400250").unwrap();
        assert_eq!(from_ms, at);
        assert!(parse_timestamp("yesterday").is_none());
    }
}
