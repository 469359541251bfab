//! Share endpoints.
//!
//! - `POST /api/share-resource`
//! - `POST /api/revoke-resource`
//! - `POST /api/revoke-all-of-type`
//! - `GET /api/shares`: issued (patient) or received (doctor)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{json_body, now};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::error::parse_resource_type;
use crate::identity::Caller;
use crate::models::ResourceGrant;
use crate::sharing::{self, ShareRequest};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareResourceRequest {
    pub doctor_id: Uuid,
    pub resource_type: String,
    pub resource_id: Option<Uuid>,
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub share_id: Uuid,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllRequest {
    pub doctor_id: Uuid,
    pub resource_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevokeAllResponse {
    pub revoked: usize,
}

/// `POST /api/share-resource`
pub async fn share(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<ShareResourceRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ResourceGrant>>, ApiError> {
    let req = json_body(payload)?;
    let request = ShareRequest {
        doctor_id: req.doctor_id,
        resource_type: parse_resource_type(&req.resource_type)?,
        resource_id: req.resource_id,
        expires_at: req.expires_at,
        notes: req.notes,
    };
    let conn = ctx.core.open_db()?;
    let grant = sharing::share_resource(&conn, &caller, &request, now())?;
    Ok(ApiResponse::ok(grant))
}

/// `POST /api/revoke-resource`
pub async fn revoke(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<ResourceGrant>>, ApiError> {
    let req = json_body(payload)?;
    let conn = ctx.core.open_db()?;
    let grant = sharing::revoke_grant(&conn, &req.share_id, &caller, now())?;
    Ok(ApiResponse::ok(grant))
}

/// `POST /api/revoke-all-of-type`
pub async fn revoke_all(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<RevokeAllRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<RevokeAllResponse>>, ApiError> {
    let req = json_body(payload)?;
    let resource_type = parse_resource_type(&req.resource_type)?;
    let conn = ctx.core.open_db()?;
    let revoked = sharing::revoke_all_of_type(&conn, &caller, &req.doctor_id, resource_type, now())?;
    Ok(ApiResponse::ok(RevokeAllResponse { revoked }))
}

/// `GET /api/shares`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<Vec<ResourceGrant>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let grants = match caller {
        Caller::Patient { .. } => sharing::list_grants_for_patient(&conn, &caller)?,
        Caller::Doctor { .. } => sharing::list_grants_for_doctor(&conn, &caller)?,
    };
    Ok(ApiResponse::ok(grants))
}
