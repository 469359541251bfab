//! Invitation endpoints.
//!
//! - `POST /api/create-invitation`: doctor invites a patient by email
//! - `POST /api/accept-invitation` / `POST /api/reject-invitation`
//! - `GET /api/invitations`: sent (doctor) or received (patient)

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::Deserialize;
use uuid::Uuid;

use super::{json_body, now};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::identity::Caller;
use crate::invitations;
use crate::models::Invitation;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvitationRequest {
    pub doctor_id: Uuid,
    pub patient_email: String,
    pub message: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationIdRequest {
    pub invitation_id: Uuid,
}

/// `POST /api/create-invitation`
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<CreateInvitationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Invitation>>, ApiError> {
    let req = json_body(payload)?;
    let conn = ctx.core.open_db()?;
    let invitation = invitations::create_invitation(
        &conn,
        &caller,
        &req.doctor_id,
        &req.patient_email,
        req.message,
        now(),
    )?;
    Ok(ApiResponse::ok(invitation))
}

/// `POST /api/accept-invitation`
pub async fn accept(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<InvitationIdRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Invitation>>, ApiError> {
    let req = json_body(payload)?;
    let conn = ctx.core.open_db()?;
    let invitation = invitations::accept_invitation(&conn, &req.invitation_id, &caller, now())?;
    Ok(ApiResponse::ok(invitation))
}

/// `POST /api/reject-invitation`
pub async fn reject(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<InvitationIdRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Invitation>>, ApiError> {
    let req = json_body(payload)?;
    let conn = ctx.core.open_db()?;
    let invitation = invitations::reject_invitation(&conn, &req.invitation_id, &caller, now())?;
    Ok(ApiResponse::ok(invitation))
}

/// `GET /api/invitations`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<ApiResponse<Vec<Invitation>>>, ApiError> {
    let conn = ctx.core.open_db()?;
    let list = match caller {
        Caller::Doctor { .. } => invitations::list_for_doctor(&conn, &caller, now())?,
        Caller::Patient { .. } => invitations::list_for_patient(&conn, &caller, now())?,
    };
    Ok(ApiResponse::ok(list))
}
