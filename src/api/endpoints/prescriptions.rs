//! Prescription and dose endpoints.
//!
//! - `POST /api/prescriptions`, `GET /api/prescriptions`
//! - `DELETE /api/prescriptions/:id`
//! - `GET /api/prescriptions/:id/doses`
//! - `POST /api/doses/:id/status`

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::{json_body, now, path_param};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::error::ServiceError;
use crate::identity::Caller;
use crate::models::{DoseStatus, MedicationDose, Prescription};
use crate::scheduler::{self, NewMedicine, NewPrescription, PrescriptionSchedule};

/// Name used when a medicine arrives without one.
const DEFAULT_MEDICINE_NAME: &str = "Medication";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineInput {
    pub medicine_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency_hours: Option<i64>,
    pub duration_days: Option<i64>,
    pub instructions: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrescriptionRequest {
    pub prescribing_doctor: Option<String>,
    pub diagnosis: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub medicines: Vec<MedicineInput>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoseStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedResponse {
    pub deleted: Uuid,
}

impl From<MedicineInput> for NewMedicine {
    fn from(input: MedicineInput) -> Self {
        let medicine_name = input
            .medicine_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_MEDICINE_NAME.to_string());
        Self {
            medicine_name,
            dosage: input.dosage,
            frequency_hours: input.frequency_hours,
            duration_days: input.duration_days,
            instructions: input.instructions,
        }
    }
}

/// `POST /api/prescriptions`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreatePrescriptionRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PrescriptionSchedule>>, ApiError> {
    let req = json_body(payload)?;
    let new = NewPrescription {
        prescribing_doctor: req.prescribing_doctor,
        diagnosis: req.diagnosis,
        start_date: req.start_date,
        end_date: req.end_date,
        medicines: req.medicines.into_iter().map(NewMedicine::from).collect(),
    };
    let conn = ctx.core.open_db()?;
    let schedule = scheduler::create_prescription(&conn, &caller, &new, now())?;
    Ok(ApiResponse::ok(schedule))
}

/// `GET /api/prescriptions`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<Vec<Prescription>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ApiResponse::ok(scheduler::list_prescriptions(&conn, &caller)?))
}

/// `DELETE /api/prescriptions/:id`
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<DeletedResponse>>, ApiError> {
    let id = path_param(id)?;
    let conn = ctx.core.open_db()?;
    scheduler::delete_prescription(&conn, &caller, &id, now())?;
    Ok(ApiResponse::ok(DeletedResponse { deleted: id }))
}

/// `GET /api/prescriptions/:id/doses`
pub async fn doses(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<Vec<MedicationDose>>>, ApiError> {
    let id = path_param(id)?;
    let conn = ctx.core.open_db()?;
    Ok(ApiResponse::ok(scheduler::list_doses(&conn, &caller, &id, now())?))
}

/// `POST /api/doses/:id/status`
pub async fn record_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<DoseStatusRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<MedicationDose>>, ApiError> {
    let id = path_param(id)?;
    let req = json_body(payload)?;
    let status = DoseStatus::from_str(&req.status)
        .map_err(|_| ServiceError::Validation(format!("unknown dose status: {}", req.status)))?;
    let conn = ctx.core.open_db()?;
    let dose = scheduler::record_dose_status(&conn, &caller, &id, status, now())?;
    Ok(ApiResponse::ok(dose))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_medicine_name_gets_default() {
        let input = MedicineInput {
            medicine_name: Some("  ".into()),
            dosage: None,
            frequency_hours: Some(8),
            duration_days: Some(2),
            instructions: None,
        };
        assert_eq!(NewMedicine::from(input).medicine_name, DEFAULT_MEDICINE_NAME);
    }
}
