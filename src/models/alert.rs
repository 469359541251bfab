use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::AlertRelatedType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomAlert {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub related_id: Uuid,
    pub related_type: AlertRelatedType,
    pub title: String,
    pub trigger_date: DateTime<Utc>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}
