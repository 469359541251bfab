//! Repository layer: entity-scoped database operations.
//!
//! Plain functions taking `&Connection`. A `rusqlite::Transaction`
//! derefs to `Connection`, so the same functions run inside a
//! caller-managed transaction.

mod alert;
mod audit;
mod grant;
mod invitation;
mod party;
mod prescription;
mod record;

use uuid::Uuid;

use super::DatabaseError;

pub use alert::*;
pub use audit::*;
pub use grant::*;
pub use invitation::*;
pub use party::*;
pub use prescription::*;
pub use record::*;

/// Parse a stored UUID column.
pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Parse an optional stored UUID column.
pub(crate) fn parse_uuid_opt(field: &str, value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

/// Extension trait to convert NotFound into None.
pub(crate) trait OptionalRow<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalRow<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
