//! Resource grants: a patient shares one resource type (or one instance of
//! it) with a doctor they have an accepted relationship with.
//!
//! A grant's only mutation is revocation, which is terminal. At most one
//! non-revoked grant exists per (doctor, patient, type, instance); sharing
//! the same key again revokes the previous grant in the same transaction.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::error::{ensure_storable, ServiceError};
use crate::identity::Caller;
use crate::models::{ResourceGrant, ResourceType};

/// Longest accepted grant note, in characters.
pub const MAX_NOTES_CHARS: usize = 1000;

/// Parameters of a share, as issued by the patient.
#[derive(Debug, Clone)]
pub struct ShareRequest {
    pub doctor_id: Uuid,
    pub resource_type: ResourceType,
    /// `None` shares every resource of the type.
    pub resource_id: Option<Uuid>,
    /// `None` never expires.
    pub expires_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// Issue a grant from the calling patient to `request.doctor_id`.
pub fn share_resource(
    conn: &Connection,
    caller: &Caller,
    request: &ShareRequest,
    now: DateTime<Utc>,
) -> Result<ResourceGrant, ServiceError> {
    let patient_id = caller.require_patient()?;

    if let Some(expires_at) = request.expires_at {
        ensure_storable("expiresAt", &expires_at)?;
        if expires_at <= now {
            return Err(ServiceError::Validation("expiry must be in the future".into()));
        }
    }
    let notes = request
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    if notes.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTES_CHARS) {
        return Err(ServiceError::Validation(format!(
            "notes exceed {MAX_NOTES_CHARS} characters"
        )));
    }

    if repository::get_doctor(conn, &request.doctor_id)?.is_none() {
        return Err(ServiceError::not_found("doctor", request.doctor_id));
    }
    if !repository::has_accepted_relationship(conn, &request.doctor_id, &patient_id)? {
        return Err(ServiceError::Forbidden(
            "no accepted invitation with this doctor".into(),
        ));
    }
    if let Some(resource_id) = &request.resource_id {
        if !repository::patient_owns_resource(conn, &patient_id, request.resource_type, resource_id)? {
            return Err(ServiceError::Forbidden(format!(
                "{} {resource_id} is not owned by the caller",
                request.resource_type
            )));
        }
    }

    let grant = ResourceGrant {
        id: Uuid::new_v4(),
        doctor_id: request.doctor_id,
        patient_id,
        resource_type: request.resource_type,
        resource_id: request.resource_id,
        expires_at: request.expires_at,
        notes,
        created_at: now,
        revoked_at: None,
    };

    let tx = conn.unchecked_transaction()?;
    let superseded = repository::revoke_open_grant_for_key(
        &tx,
        &grant.doctor_id,
        &patient_id,
        grant.resource_type,
        grant.resource_id.as_ref(),
        &now,
    )?;
    match repository::insert_grant(&tx, &grant) {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(ServiceError::Conflict("a concurrent share won the race".into()));
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit()?;

    tracing::info!(
        grant_id = %grant.id,
        doctor_id = %grant.doctor_id,
        resource_type = %grant.resource_type,
        instance = grant.resource_id.is_some(),
        superseded,
        "Resource shared"
    );
    Ok(grant)
}

/// Revoke one grant owned by the calling patient. Revoking an already
/// revoked grant returns it unchanged.
pub fn revoke_grant(
    conn: &Connection,
    grant_id: &Uuid,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<ResourceGrant, ServiceError> {
    let patient_id = caller.require_patient()?;
    let grant = repository::get_grant(conn, grant_id)?
        .ok_or_else(|| ServiceError::not_found("share", grant_id))?;
    if grant.patient_id != patient_id {
        return Err(ServiceError::Forbidden("share belongs to another patient".into()));
    }

    if repository::revoke_grant(conn, grant_id, &now)? > 0 {
        tracing::info!(grant_id = %grant_id, doctor_id = %grant.doctor_id, "Share revoked");
    }
    repository::get_grant(conn, grant_id)?.ok_or_else(|| ServiceError::not_found("share", grant_id))
}

/// Revoke every open grant of `resource_type` from the calling patient to
/// `doctor_id`. Returns how many grants were revoked.
pub fn revoke_all_of_type(
    conn: &Connection,
    caller: &Caller,
    doctor_id: &Uuid,
    resource_type: ResourceType,
    now: DateTime<Utc>,
) -> Result<usize, ServiceError> {
    let patient_id = caller.require_patient()?;
    let revoked = repository::revoke_grants_of_type(conn, doctor_id, &patient_id, resource_type, &now)?;
    tracing::info!(
        doctor_id = %doctor_id,
        resource_type = %resource_type,
        revoked,
        "Revoked all shares of type"
    );
    Ok(revoked)
}

/// Grants the calling patient has issued.
pub fn list_grants_for_patient(
    conn: &Connection,
    caller: &Caller,
) -> Result<Vec<ResourceGrant>, ServiceError> {
    let patient_id = caller.require_patient()?;
    Ok(repository::list_grants_for_patient(conn, &patient_id)?)
}

/// Grants the calling doctor has received.
pub fn list_grants_for_doctor(
    conn: &Connection,
    caller: &Caller,
) -> Result<Vec<ResourceGrant>, ServiceError> {
    let doctor_id = caller.require_doctor()?;
    Ok(repository::list_grants_for_doctor(conn, &doctor_id)?)
}
