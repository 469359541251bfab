use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DoseStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prescription {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub prescribing_doctor: Option<String>,
    pub diagnosis: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionMedicine {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub medicine_name: String,
    pub dosage: Option<String>,
    pub frequency_hours: Option<i64>,
    pub duration_days: Option<i64>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationDose {
    pub id: Uuid,
    pub prescription_medicine_id: Uuid,
    pub scheduled_at: DateTime<Utc>,
    pub status: DoseStatus,
}
