use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ResourceType;

/// A patient-issued share of one resource type (or one instance) with a doctor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGrant {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub resource_type: ResourceType,
    /// `None` covers every resource of the type.
    pub resource_id: Option<Uuid>,
    /// `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ResourceGrant {
    /// Not revoked and not past its expiry.
    pub fn is_active(&self, now: &DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at.map_or(true, |exp| exp > *now)
    }
}
