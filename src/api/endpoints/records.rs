//! Patient records and the doctor read path.
//!
//! - `POST /api/records`
//! - `GET /api/patients/:patient_id/resources?resourceType=…`

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use super::{json_body, now, path_param, query_params};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::error::parse_resource_type;
use crate::identity::Caller;
use crate::models::PatientRecord;
use crate::records::{self, SharedResource};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRecordRequest {
    pub resource_type: String,
    pub title: String,
    pub detail: Option<String>,
    pub recorded_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceQuery {
    pub resource_type: String,
}

/// `POST /api/records`
pub async fn register(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<RegisterRecordRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PatientRecord>>, ApiError> {
    let req = json_body(payload)?;
    let resource_type = parse_resource_type(&req.resource_type)?;
    let recorded_at = req.recorded_at.unwrap_or_else(now);
    let conn = ctx.core.open_db()?;
    let record = records::register_record(
        &conn,
        &caller,
        resource_type,
        &req.title,
        req.detail,
        recorded_at,
    )?;
    Ok(ApiResponse::ok(record))
}

/// `GET /api/patients/:patient_id/resources`
pub async fn list_for_patient(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    patient_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<ResourceQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<SharedResource>>>, ApiError> {
    let patient_id = path_param(patient_id)?;
    let q = query_params(query)?;
    let resource_type = parse_resource_type(&q.resource_type)?;
    let conn = ctx.core.open_db()?;
    let resources = records::visible_resources(&conn, &caller, &patient_id, resource_type, now())?;
    Ok(ApiResponse::ok(resources))
}
