//! API endpoint handlers.
//!
//! Each module maps one group of routes onto the domain operations.
//! Handlers open their own connection, call exactly one operation and
//! wrap the result in the success envelope.

pub mod access;
pub mod alerts;
pub mod health;
pub mod invitations;
pub mod prescriptions;
pub mod records;
pub mod sharing;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query};
use axum::Json;
use chrono::{DateTime, Utc};

use crate::api::error::ApiError;
use crate::db::timestamp;

/// Request time, truncated to stored precision.
pub(crate) fn now() -> DateTime<Utc> {
    timestamp::truncate(&Utc::now())
}

/// Unwrap a JSON body, turning extractor rejections into the error envelope.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

pub(crate) fn path_param<T>(param: Result<Path<T>, PathRejection>) -> Result<T, ApiError> {
    param
        .map(|Path(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

pub(crate) fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
