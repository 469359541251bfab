//! Authenticated caller identity.
//!
//! Supplied by the authentication collaborator and trusted as-is for
//! every ownership check. The core never re-authenticates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ServiceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Caller {
    Doctor { doctor_id: Uuid, email: String },
    Patient { patient_id: Uuid, email: String },
}

impl Caller {
    pub fn doctor(doctor_id: Uuid, email: &str) -> Self {
        Self::Doctor {
            doctor_id,
            email: normalize_email(email),
        }
    }

    pub fn patient(patient_id: Uuid, email: &str) -> Self {
        Self::Patient {
            patient_id,
            email: normalize_email(email),
        }
    }

    /// Verified email, already normalized.
    pub fn email(&self) -> &str {
        match self {
            Self::Doctor { email, .. } | Self::Patient { email, .. } => email,
        }
    }

    /// Subject id regardless of role (for audit entries).
    pub fn subject_id(&self) -> Uuid {
        match self {
            Self::Doctor { doctor_id, .. } => *doctor_id,
            Self::Patient { patient_id, .. } => *patient_id,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Self::Doctor { .. } => "doctor",
            Self::Patient { .. } => "patient",
        }
    }

    /// The caller's doctor id, or `Forbidden` for patients.
    pub fn require_doctor(&self) -> Result<Uuid, ServiceError> {
        match self {
            Self::Doctor { doctor_id, .. } => Ok(*doctor_id),
            Self::Patient { .. } => Err(ServiceError::Forbidden(
                "operation requires a doctor account".into(),
            )),
        }
    }

    /// The caller's patient id, or `Forbidden` for doctors.
    pub fn require_patient(&self) -> Result<Uuid, ServiceError> {
        match self {
            Self::Patient { patient_id, .. } => Ok(*patient_id),
            Self::Doctor { .. } => Err(ServiceError::Forbidden(
                "operation requires a patient account".into(),
            )),
        }
    }
}

/// Trim and lower-case an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn constructors_normalize_email() {
        let c = Caller::patient(Uuid::new_v4(), "  Ana.Lopez@Example.COM ");
        assert_eq!(c.email(), "ana.lopez@example.com");
    }

    #[test]
    fn role_requirements() {
        let doc = Caller::doctor(Uuid::new_v4(), "dr@clinic.io");
        assert!(doc.require_doctor().is_ok());
        assert_eq!(doc.require_patient().unwrap_err().kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn serializes_with_role_tag() {
        let id = Uuid::nil();
        let json = serde_json::to_value(Caller::doctor(id, "dr@clinic.io")).unwrap();
        assert_eq!(json["role"], "doctor");
        assert_eq!(json["doctor_id"], id.to_string());
    }
}
