//! Alert endpoints.
//!
//! - `GET /api/alerts?unreadOnly=true`
//! - `POST /api/alerts/:id/read`

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{path_param, query_params};
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, ApiResponse};
use crate::identity::Caller;
use crate::models::CustomAlert;
use crate::scheduler;

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AlertQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertReadResponse {
    pub alert_id: Uuid,
    pub is_read: bool,
}

/// `GET /api/alerts`
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    query: Result<Query<AlertQuery>, QueryRejection>,
) -> Result<Json<ApiResponse<Vec<CustomAlert>>>, ApiError> {
    let q = query_params(query)?;
    let conn = ctx.core.open_db()?;
    Ok(ApiResponse::ok(scheduler::list_alerts(&conn, &caller, q.unread_only)?))
}

/// `POST /api/alerts/:id/read`
pub async fn mark_read(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<Caller>,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ApiResponse<AlertReadResponse>>, ApiError> {
    let alert_id = path_param(id)?;
    let conn = ctx.core.open_db()?;
    scheduler::mark_alert_read(&conn, &caller, &alert_id)?;
    Ok(ApiResponse::ok(AlertReadResponse { alert_id, is_read: true }))
}
