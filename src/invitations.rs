//! Invitation lifecycle: a doctor invites a patient by email, the patient
//! accepts or rejects. An accepted invitation is what establishes the
//! doctor-patient relationship every grant depends on.
//!
//! State machine: `pending → accepted | rejected | expired`. Expiry is
//! evaluated lazily on every read (`pending` past `expires_at` reads as
//! `expired`) and materialised by [`expire_stale_invitations`] or when the
//! same doctor re-invites the same email.

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository;
use crate::error::ServiceError;
use crate::identity::{normalize_email, Caller};
use crate::models::{Invitation, InvitationStatus};

/// Days an invitation stays open.
pub const INVITATION_TTL_DAYS: i64 = 30;

/// Longest accepted invitation message, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9\-]+(\.[a-z0-9\-]+)*\.[a-z]{2,}$")
        .expect("email pattern compiles")
});

/// Normalize and validate a patient email.
pub fn validate_email(raw: &str) -> Result<String, ServiceError> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err(ServiceError::Validation("patient email is required".into()));
    }
    if !EMAIL_PATTERN.is_match(&email) {
        return Err(ServiceError::Validation(format!("invalid email address: {email}")));
    }
    Ok(email)
}

fn clean_message(message: Option<String>) -> Result<Option<String>, ServiceError> {
    let message = message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());
    if let Some(m) = &message {
        if m.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ServiceError::Validation(format!(
                "message exceeds {MAX_MESSAGE_CHARS} characters"
            )));
        }
    }
    Ok(message)
}

// ═══════════════════════════════════════════════════════════
// Creation
// ═══════════════════════════════════════════════════════════

/// Create a pending invitation from `doctor_id` to `patient_email`.
///
/// The caller must be that doctor. Lapsed pending rows for the same pair
/// are materialised as expired first so they no longer hold the
/// one-pending-per-pair slot.
pub fn create_invitation(
    conn: &Connection,
    caller: &Caller,
    doctor_id: &Uuid,
    patient_email: &str,
    message: Option<String>,
    now: DateTime<Utc>,
) -> Result<Invitation, ServiceError> {
    let caller_doctor = caller.require_doctor()?;
    if caller_doctor != *doctor_id {
        return Err(ServiceError::Forbidden(
            "doctors can only send invitations on their own behalf".into(),
        ));
    }
    let email = validate_email(patient_email)?;
    let message = clean_message(message)?;

    if repository::get_doctor(conn, doctor_id)?.is_none() {
        return Err(ServiceError::not_found("doctor", doctor_id));
    }

    let invitation = Invitation {
        id: Uuid::new_v4(),
        doctor_id: *doctor_id,
        patient_email: email.clone(),
        patient_id: None,
        status: InvitationStatus::Pending,
        message,
        created_at: now,
        updated_at: now,
        expires_at: now + Duration::days(INVITATION_TTL_DAYS),
    };

    let tx = conn.unchecked_transaction()?;
    if repository::has_accepted_invitation_for_email(&tx, doctor_id, &email)? {
        return Err(ServiceError::Conflict(format!(
            "{email} has already accepted an invitation from this doctor"
        )));
    }
    let expired = repository::expire_lapsed_for_pair(&tx, doctor_id, &email, &now)?;
    match repository::insert_invitation(&tx, &invitation) {
        Ok(()) => {}
        Err(e) if e.is_unique_violation() => {
            return Err(ServiceError::Conflict(format!(
                "a pending invitation for {email} already exists"
            )));
        }
        Err(e) => return Err(e.into()),
    }
    tx.commit()?;

    tracing::info!(
        invitation_id = %invitation.id,
        doctor_id = %doctor_id,
        superseded_expired = expired,
        "Invitation created"
    );
    Ok(invitation)
}

// ═══════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════

/// Accept an invitation addressed to the calling patient.
pub fn accept_invitation(
    conn: &Connection,
    invitation_id: &Uuid,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Invitation, ServiceError> {
    resolve_invitation(conn, invitation_id, caller, InvitationStatus::Accepted, now)
}

/// Reject an invitation addressed to the calling patient.
pub fn reject_invitation(
    conn: &Connection,
    invitation_id: &Uuid,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Invitation, ServiceError> {
    resolve_invitation(conn, invitation_id, caller, InvitationStatus::Rejected, now)
}

fn resolve_invitation(
    conn: &Connection,
    invitation_id: &Uuid,
    caller: &Caller,
    target: InvitationStatus,
    now: DateTime<Utc>,
) -> Result<Invitation, ServiceError> {
    let patient_id = caller.require_patient()?;
    let invitation = repository::get_invitation(conn, invitation_id)?
        .ok_or_else(|| ServiceError::not_found("invitation", invitation_id))?;

    if invitation.patient_email != caller.email() {
        return Err(ServiceError::Forbidden(
            "invitation is addressed to a different email".into(),
        ));
    }
    if invitation.patient_id.is_some_and(|bound| bound != patient_id) {
        return Err(ServiceError::Forbidden(
            "invitation is bound to a different patient".into(),
        ));
    }
    check_still_pending(&invitation, &now)?;

    if repository::get_patient(conn, &patient_id)?.is_none() {
        return Err(ServiceError::not_found("patient", patient_id));
    }

    let updated = repository::resolve_pending_invitation(conn, invitation_id, &patient_id, target, &now)?;
    if updated == 0 {
        // Lost a race with another resolution or the expiry instant passed.
        let current = repository::get_invitation(conn, invitation_id)?
            .ok_or_else(|| ServiceError::not_found("invitation", invitation_id))?;
        check_still_pending(&current, &now)?;
        return Err(ServiceError::Conflict("invitation could not be resolved".into()));
    }

    tracing::info!(
        invitation_id = %invitation_id,
        doctor_id = %invitation.doctor_id,
        status = %target,
        "Invitation resolved"
    );

    repository::get_invitation(conn, invitation_id)?
        .ok_or_else(|| ServiceError::not_found("invitation", invitation_id))
}

fn check_still_pending(invitation: &Invitation, now: &DateTime<Utc>) -> Result<(), ServiceError> {
    match invitation.effective_status(now) {
        InvitationStatus::Pending => Ok(()),
        InvitationStatus::Expired => Err(ServiceError::Expired(format!(
            "invitation expired at {}",
            invitation.expires_at.to_rfc3339()
        ))),
        resolved => Err(ServiceError::Conflict(format!("invitation already {resolved}"))),
    }
}

// ═══════════════════════════════════════════════════════════
// Reads
// ═══════════════════════════════════════════════════════════

/// One invitation, visible to its doctor and its addressee.
pub fn get_invitation(
    conn: &Connection,
    invitation_id: &Uuid,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Invitation, ServiceError> {
    let invitation = repository::get_invitation(conn, invitation_id)?
        .ok_or_else(|| ServiceError::not_found("invitation", invitation_id))?;

    let visible = match caller {
        Caller::Doctor { doctor_id, .. } => invitation.doctor_id == *doctor_id,
        Caller::Patient { patient_id, email } => {
            invitation.patient_email == *email || invitation.patient_id == Some(*patient_id)
        }
    };
    if !visible {
        return Err(ServiceError::Forbidden("invitation belongs to another account".into()));
    }
    Ok(invitation.observed_at(&now))
}

/// Invitations the calling doctor has sent, with lazy expiry applied.
pub fn list_for_doctor(
    conn: &Connection,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Vec<Invitation>, ServiceError> {
    let doctor_id = caller.require_doctor()?;
    let invitations = repository::list_invitations_for_doctor(conn, &doctor_id)?;
    Ok(invitations.into_iter().map(|i| i.observed_at(&now)).collect())
}

/// Invitations addressed to the calling patient, with lazy expiry applied.
pub fn list_for_patient(
    conn: &Connection,
    caller: &Caller,
    now: DateTime<Utc>,
) -> Result<Vec<Invitation>, ServiceError> {
    let patient_id = caller.require_patient()?;
    let invitations = repository::list_invitations_for_patient(conn, caller.email(), Some(&patient_id))?;
    Ok(invitations.into_iter().map(|i| i.observed_at(&now)).collect())
}

/// Materialise every lapsed pending invitation as `expired`.
pub fn expire_stale_invitations(conn: &Connection, now: DateTime<Utc>) -> Result<usize, ServiceError> {
    let expired = repository::expire_lapsed_invitations(conn, &now)?;
    if expired > 0 {
        tracing::info!(count = expired, "Expired stale invitations");
    }
    Ok(expired)
}
