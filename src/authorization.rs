//! Doctor-side access resolution over patient data.
//!
//! Cascade, default-deny, checked in order:
//! 1. No accepted invitation between doctor and patient → DENY
//! 2. Active blanket grant for the type (`resource_id` null) → ALL
//! 3. Active per-instance grants → exactly those ids
//! 4. Default → DENY
//!
//! A grant is active while `revoked_at` is null and `expires_at` is null
//! or later than `now`. Grants are read in one statement gated on the
//! relationship, so a concurrent revoke-all is seen entirely or not at all.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::db::repository;
use crate::error::{parse_resource_type, ServiceError};
use crate::identity::Caller;
use crate::models::{DoctorPatientRelationship, ResourceType};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What a doctor may read of one resource type for one patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "scope", content = "resourceIds", rename_all = "snake_case")]
pub enum AccessScope {
    /// Every resource of the type, present and future.
    All,
    /// Only these instances. Empty means no access.
    Resources(BTreeSet<Uuid>),
}

impl AccessScope {
    pub fn none() -> Self {
        Self::Resources(BTreeSet::new())
    }

    pub fn allows(&self, resource_id: &Uuid) -> bool {
        match self {
            Self::All => true,
            Self::Resources(ids) => ids.contains(resource_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Resources(ids) if ids.is_empty())
    }
}

/// Why access was granted (or denied), for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// No accepted invitation links the doctor and patient.
    NoRelationship,
    /// Active grant covering every resource of the type.
    BlanketGrant,
    /// Active grant naming this resource.
    InstanceGrant,
    /// Relationship exists but no grant covers the request.
    NoGrant,
}

/// Result of an authorization check.
#[derive(Debug, Clone, Serialize)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
}

impl AccessDecision {
    fn allow(reason: AccessReason) -> Self {
        Self { allowed: true, reason }
    }

    fn deny(reason: AccessReason) -> Self {
        Self { allowed: false, reason }
    }
}

// ═══════════════════════════════════════════════════════════
// Resolution
// ═══════════════════════════════════════════════════════════

/// Resources of `resource_type` the doctor may read for the patient at `now`.
pub fn resolve_accessible_resources(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: ResourceType,
    now: &DateTime<Utc>,
) -> Result<AccessScope, ServiceError> {
    let grants = repository::list_effective_grants(conn, doctor_id, patient_id, resource_type, now)?;

    let mut ids = BTreeSet::new();
    for grant in grants {
        match grant.resource_id {
            None => return Ok(AccessScope::All),
            Some(id) => {
                ids.insert(id);
            }
        }
    }
    Ok(AccessScope::Resources(ids))
}

/// String-typed variant for the transport layer; unknown names are
/// `InvalidResourceType`.
pub fn resolve_accessible_resources_by_name(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: &str,
    now: &DateTime<Utc>,
) -> Result<AccessScope, ServiceError> {
    let resource_type = parse_resource_type(resource_type)?;
    resolve_accessible_resources(conn, doctor_id, patient_id, resource_type, now)
}

/// Resolution on behalf of a caller, who must be one of the two parties.
pub fn accessible_resources_for_caller(
    conn: &Connection,
    caller: &Caller,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: ResourceType,
    now: &DateTime<Utc>,
) -> Result<AccessScope, ServiceError> {
    let is_party = match caller {
        Caller::Doctor { doctor_id: own, .. } => own == doctor_id,
        Caller::Patient { patient_id: own, .. } => own == patient_id,
    };
    if !is_party {
        return Err(ServiceError::Forbidden(
            "access can only be resolved by the doctor or the patient involved".into(),
        ));
    }
    resolve_accessible_resources(conn, doctor_id, patient_id, resource_type, now)
}

/// True iff an accepted invitation links the doctor and the patient.
pub fn is_doctor_authorized_for_patient(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
) -> Result<bool, ServiceError> {
    Ok(repository::has_accepted_relationship(conn, doctor_id, patient_id)?)
}

/// Decide a single read. With `resource_id = None` the question is whether
/// the doctor may read the whole type, which only a blanket grant allows.
pub fn check_resource_access(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: ResourceType,
    resource_id: Option<&Uuid>,
    now: &DateTime<Utc>,
) -> Result<AccessDecision, ServiceError> {
    // Rule 1: relationship
    if !is_doctor_authorized_for_patient(conn, doctor_id, patient_id)? {
        return Ok(AccessDecision::deny(AccessReason::NoRelationship));
    }

    // Rules 2 and 3: grants
    let scope = resolve_accessible_resources(conn, doctor_id, patient_id, resource_type, now)?;
    let decision = match (&scope, resource_id) {
        (AccessScope::All, _) => AccessDecision::allow(AccessReason::BlanketGrant),
        (AccessScope::Resources(ids), Some(id)) if ids.contains(id) => {
            AccessDecision::allow(AccessReason::InstanceGrant)
        }
        // Rule 4: default deny
        _ => AccessDecision::deny(AccessReason::NoGrant),
    };
    Ok(decision)
}

/// Relationships visible to the caller: a doctor's patients or a
/// patient's doctors.
pub fn list_relationships(
    conn: &Connection,
    caller: &Caller,
) -> Result<Vec<DoctorPatientRelationship>, ServiceError> {
    let relationships = match caller {
        Caller::Doctor { doctor_id, .. } => repository::list_relationships_for_doctor(conn, doctor_id)?,
        Caller::Patient { patient_id, .. } => {
            repository::list_relationships_for_patient(conn, patient_id)?
        }
    };
    Ok(relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::error::ErrorKind;
    use crate::invitations;
    use crate::models::{Doctor, Patient, PatientRecord};
    use crate::sharing;
    use chrono::Duration;

    struct World {
        conn: Connection,
        doctor: Doctor,
        patient: Patient,
    }

    fn linked_world() -> World {
        let conn = test_db();
        let doctor = seed_doctor(&conn, "dr@clinic.io");
        let patient = seed_patient(&conn, "ana@example.com");
        let inv = invitations::create_invitation(
            &conn,
            &Caller::doctor(doctor.id, &doctor.email),
            &doctor.id,
            &patient.email,
            None,
            t0(),
        )
        .unwrap();
        invitations::accept_invitation(&conn, &inv.id, &Caller::patient(patient.id, &patient.email), t0())
            .unwrap();
        World { conn, doctor, patient }
    }

    fn record(w: &World, resource_type: ResourceType) -> Uuid {
        let rec = PatientRecord {
            id: Uuid::new_v4(),
            patient_id: w.patient.id,
            resource_type,
            title: "entry".into(),
            detail: None,
            recorded_at: t0(),
        };
        repository::insert_record(&w.conn, &rec).unwrap();
        rec.id
    }

    fn share(w: &World, resource_type: ResourceType, resource_id: Option<Uuid>, expires: Option<DateTime<Utc>>) {
        sharing::share_resource(
            &w.conn,
            &Caller::patient(w.patient.id, &w.patient.email),
            &sharing::ShareRequest {
                doctor_id: w.doctor.id,
                resource_type,
                resource_id,
                expires_at: expires,
                notes: None,
            },
            t0(),
        )
        .unwrap();
    }

    #[test]
    fn no_grants_resolves_to_empty() {
        let w = linked_world();
        let scope =
            resolve_accessible_resources(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Vaccines, &t0())
                .unwrap();
        assert!(scope.is_empty());
    }

    #[test]
    fn blanket_grant_short_circuits_to_all() {
        let w = linked_world();
        let rec = record(&w, ResourceType::Vaccines);
        share(&w, ResourceType::Vaccines, Some(rec), None);
        share(&w, ResourceType::Vaccines, None, None);

        let scope =
            resolve_accessible_resources(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Vaccines, &t0())
                .unwrap();
        assert_eq!(scope, AccessScope::All);
        assert!(scope.allows(&Uuid::new_v4()));
    }

    #[test]
    fn instance_grants_yield_exact_set() {
        let w = linked_world();
        let a = record(&w, ResourceType::Documents);
        let b = record(&w, ResourceType::Documents);
        let _unshared = record(&w, ResourceType::Documents);
        share(&w, ResourceType::Documents, Some(a), None);
        share(&w, ResourceType::Documents, Some(b), None);

        let scope =
            resolve_accessible_resources(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Documents, &t0())
                .unwrap();
        assert_eq!(scope, AccessScope::Resources(BTreeSet::from([a, b])));
    }

    #[test]
    fn expiry_instant_is_exclusive() {
        let w = linked_world();
        let expires = t0() + Duration::days(7);
        share(&w, ResourceType::Allergies, None, Some(expires));

        let before = resolve_accessible_resources(
            &w.conn,
            &w.doctor.id,
            &w.patient.id,
            ResourceType::Allergies,
            &(expires - Duration::seconds(1)),
        )
        .unwrap();
        assert_eq!(before, AccessScope::All);

        let at = resolve_accessible_resources(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Allergies, &expires)
            .unwrap();
        assert!(at.is_empty());
    }

    #[test]
    fn unknown_type_name_is_rejected() {
        let w = linked_world();
        let err = resolve_accessible_resources_by_name(&w.conn, &w.doctor.id, &w.patient.id, "x-rays", &t0())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidResourceType);
    }

    #[test]
    fn decisions_explain_themselves() {
        let w = linked_world();
        let stranger = seed_doctor(&w.conn, "stranger@clinic.io");
        let rec = record(&w, ResourceType::Documents);

        let d = check_resource_access(&w.conn, &stranger.id, &w.patient.id, ResourceType::Documents, Some(&rec), &t0())
            .unwrap();
        assert_eq!(d.reason, AccessReason::NoRelationship);
        assert!(!d.allowed);

        let d = check_resource_access(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Documents, Some(&rec), &t0())
            .unwrap();
        assert_eq!(d.reason, AccessReason::NoGrant);

        share(&w, ResourceType::Documents, Some(rec), None);
        let d = check_resource_access(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Documents, Some(&rec), &t0())
            .unwrap();
        assert!(d.allowed);
        assert_eq!(d.reason, AccessReason::InstanceGrant);

        // Whole-type reads need a blanket grant
        let d = check_resource_access(&w.conn, &w.doctor.id, &w.patient.id, ResourceType::Documents, None, &t0())
            .unwrap();
        assert!(!d.allowed);
    }

    #[test]
    fn third_party_cannot_resolve() {
        let w = linked_world();
        let other = seed_patient(&w.conn, "bob@example.com");
        let err = accessible_resources_for_caller(
            &w.conn,
            &Caller::patient(other.id, &other.email),
            &w.doctor.id,
            &w.patient.id,
            ResourceType::Vaccines,
            &t0(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn relationships_by_role() {
        let w = linked_world();
        let as_doctor = list_relationships(&w.conn, &Caller::doctor(w.doctor.id, &w.doctor.email)).unwrap();
        assert_eq!(as_doctor.len(), 1);
        assert_eq!(as_doctor[0].patient_id, w.patient.id);
        let as_patient = list_relationships(&w.conn, &Caller::patient(w.patient.id, &w.patient.email)).unwrap();
        assert_eq!(as_patient[0].doctor_id, w.doctor.id);
    }
}
