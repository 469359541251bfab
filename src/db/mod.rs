pub mod repository;
pub mod sqlite;
pub mod timestamp;

pub use repository::*;
pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Invalid stored value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),
}

impl DatabaseError {
    /// True when the underlying SQLite error is a UNIQUE/PRIMARY KEY violation.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_detected() {
        let conn = open_memory_database().unwrap();
        conn.execute(
            "INSERT INTO patients (id, email, full_name, created_at) VALUES ('p1', 'a@b.co', 'A', 'x')",
            [],
        )
        .unwrap();
        let err = conn
            .execute(
                "INSERT INTO patients (id, email, full_name, created_at) VALUES ('p2', 'a@b.co', 'B', 'x')",
                [],
            )
            .map_err(DatabaseError::from)
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn other_errors_are_not_unique_violations() {
        let err = DatabaseError::ConstraintViolation("bad".into());
        assert!(!err.is_unique_violation());
    }
}
