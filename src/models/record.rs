use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ResourceType;

/// A patient-owned document, allergy, vaccine or antecedente entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub resource_type: ResourceType,
    pub title: String,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
