//! Timestamp storage format.
//!
//! Every instant is stored as a fixed-width UTC string
//! (`2026-03-01T08:00:00.000000Z`) so SQL string comparison agrees
//! with chronological order. Values are truncated to microseconds.
//! The width only holds for four-digit years; callers reject anything
//! outside [`is_storable`] before it reaches the store.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};

use super::DatabaseError;

const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Format an instant for storage or for use as a SQL comparison bound.
pub fn to_db(ts: &DateTime<Utc>) -> String {
    ts.format(STORAGE_FORMAT).to_string()
}

/// True when `ts` formats with a four-digit year (0000-9999).
pub fn is_storable(ts: &DateTime<Utc>) -> bool {
    (0..=9999).contains(&ts.year())
}

/// Parse a stored timestamp. `field` names the column in the error.
pub fn from_db(field: &str, value: &str) -> Result<DateTime<Utc>, DatabaseError> {
    NaiveDateTime::parse_from_str(value, STORAGE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| DatabaseError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        })
}

/// Parse an optional stored timestamp.
pub fn from_db_opt(
    field: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    value.map(|v| from_db(field, &v)).transpose()
}

/// Truncate an instant to the stored precision.
pub fn truncate(ts: &DateTime<Utc>) -> DateTime<Utc> {
    // The formatted value always parses back; fall back to the input otherwise.
    from_db("truncate", &to_db(ts)).unwrap_or(*ts)
}
