use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Doctor–patient relationship, derived from an accepted invitation.
///
/// There is no relationship table. Revoking grants leaves it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPatientRelationship {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub patient_id: Uuid,
    pub patient_name: String,
    pub invitation_id: Uuid,
    pub since: DateTime<Utc>,
}
