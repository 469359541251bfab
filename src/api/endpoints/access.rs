//! Access resolution endpoints.
//!
//! - `GET /api/accessible-resources?doctorId&patientId&resourceType`
//! - `GET /api/relationships`

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{now, query_params};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::authorization::{self, AccessScope};
use crate::error::parse_resource_type;
use crate::identity::Caller;
use crate::models::{DoctorPatientRelationship, ResourceType};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessQuery {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub resource_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    pub resource_type: ResourceType,
    #[serde(flatten)]
    pub scope: AccessScope,
}

/// `GET /api/accessible-resources`
pub async fn accessible(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<AccessQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<AccessResponse>>, ApiError> {
    let q = query_params(query)?;
    let resource_type = parse_resource_type(&q.resource_type)?;
    let conn = ctx.core.open_db()?;
    let scope = authorization::accessible_resources_for_caller(
        &conn,
        &caller,
        &q.doctor_id,
        &q.patient_id,
        resource_type,
        &now(),
    )?;
    Ok(ApiResponse::ok(AccessResponse { resource_type, scope }))
}

/// `GET /api/relationships`
pub async fn relationships(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<Vec<DoctorPatientRelationship>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(ApiResponse::ok(authorization::list_relationships(&conn, &caller)?))
}
