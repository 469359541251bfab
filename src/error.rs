//! Domain error taxonomy shared by the consent and scheduling operations.
//!
//! Every core operation returns `Result<_, ServiceError>`; the API layer
//! maps the kind to a transport status.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::{timestamp, DatabaseError};

/// Stable error kind, exposed to clients as the error `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    ValidationError,
    Unauthenticated,
    Forbidden,
    NotFound,
    Conflict,
    Expired,
    InvalidResourceType,
    Internal,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Expired => "EXPIRED",
            Self::InvalidResourceType => "INVALID_RESOURCE_TYPE",
            Self::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Expired: {0}")]
    Expired(String),

    #[error("Invalid resource type: {0}")]
    InvalidResourceType(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Expired(_) => ErrorKind::Expired,
            Self::InvalidResourceType(_) => ErrorKind::InvalidResourceType,
            Self::Database(_) => ErrorKind::Internal,
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::Database(DatabaseError::Sqlite(err))
    }
}

/// Reject an instant the store cannot keep in time order.
pub fn ensure_storable(field: &str, ts: &DateTime<Utc>) -> Result<(), ServiceError> {
    if timestamp::is_storable(ts) {
        Ok(())
    } else {
        Err(ServiceError::Validation(format!(
            "{field} must fall between years 0000 and 9999"
        )))
    }
}

/// Parse a client-supplied resource type name.
pub fn parse_resource_type(value: &str) -> Result<crate::models::ResourceType, ServiceError> {
    value
        .trim()
        .parse()
        .map_err(|_| ServiceError::InvalidResourceType(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;
    use chrono::TimeZone;

    #[test]
    fn database_errors_are_internal() {
        let err: ServiceError = DatabaseError::ConstraintViolation("x".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn resource_type_parsing_is_typed() {
        assert_eq!(parse_resource_type(" vaccines ").unwrap(), ResourceType::Vaccines);
        let err = parse_resource_type("x-rays").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResourceType);
    }

    #[test]
    fn far_future_instants_are_validation_errors() {
        let beyond = Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap();
        let err = ensure_storable("expiresAt", &beyond).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert!(ensure_storable("expiresAt", &Utc::now()).is_ok());
    }

    #[test]
    fn kind_codes_are_screaming_snake() {
        assert_eq!(ErrorKind::InvalidResourceType.as_str(), "INVALID_RESOURCE_TYPE");
        assert_eq!(
            serde_json::to_string(&ErrorKind::ValidationError).unwrap(),
            "\"VALIDATION_ERROR\""
        );
    }
}
