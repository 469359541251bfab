//! Patient-owned records and the doctor-side read path over them.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::authorization::{self, AccessScope};
use crate::db::repository;
use crate::error::{ensure_storable, ServiceError};
use crate::identity::Caller;
use crate::models::{PatientRecord, ResourceType};

/// A resource as shown to a doctor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedResource {
    pub resource_id: Uuid,
    pub resource_type: ResourceType,
    pub title: String,
    pub detail: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Register a document, allergy, vaccine or antecedent for the caller.
pub fn register_record(
    conn: &Connection,
    caller: &Caller,
    resource_type: ResourceType,
    title: &str,
    detail: Option<String>,
    recorded_at: DateTime<Utc>,
) -> Result<PatientRecord, ServiceError> {
    let patient_id = caller.require_patient()?;
    if !resource_type.is_patient_record() {
        return Err(ServiceError::Validation(format!(
            "{resource_type} are created through their own endpoint"
        )));
    }
    let title = title.trim();
    if title.is_empty() {
        return Err(ServiceError::Validation("title is required".into()));
    }
    ensure_storable("recordedAt", &recorded_at)?;

    let record = PatientRecord {
        id: Uuid::new_v4(),
        patient_id,
        resource_type,
        title: title.to_string(),
        detail: detail.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
        recorded_at,
    };
    repository::insert_record(conn, &record)?;
    tracing::info!(record_id = %record.id, resource_type = %resource_type, "Record registered");
    Ok(record)
}

/// Every resource of `resource_type` owned by the patient.
fn owned_resources(
    conn: &Connection,
    patient_id: &Uuid,
    resource_type: ResourceType,
) -> Result<Vec<SharedResource>, ServiceError> {
    let resources = match resource_type {
        ResourceType::Prescriptions => repository::list_prescriptions_for_patient(conn, patient_id)?
            .into_iter()
            .map(|rx| SharedResource {
                resource_id: rx.id,
                resource_type,
                title: rx.diagnosis,
                detail: rx.prescribing_doctor,
                recorded_at: rx.start_date,
            })
            .collect(),
        ResourceType::Medications => {
            let prescriptions = repository::list_prescriptions_for_patient(conn, patient_id)?;
            let mut resources = Vec::new();
            for rx in prescriptions {
                for med in repository::list_medicines(conn, &rx.id)? {
                    resources.push(SharedResource {
                        resource_id: med.id,
                        resource_type,
                        title: med.medicine_name,
                        detail: med.dosage,
                        recorded_at: rx.start_date,
                    });
                }
            }
            resources
        }
        _ => repository::list_records(conn, patient_id, resource_type)?
            .into_iter()
            .map(|rec| SharedResource {
                resource_id: rec.id,
                resource_type,
                title: rec.title,
                detail: rec.detail,
                recorded_at: rec.recorded_at,
            })
            .collect(),
    };
    Ok(resources)
}

/// Resources of one type the calling doctor may read for `patient_id`.
/// Patients reading their own data see everything.
pub fn visible_resources(
    conn: &Connection,
    caller: &Caller,
    patient_id: &Uuid,
    resource_type: ResourceType,
    now: DateTime<Utc>,
) -> Result<Vec<SharedResource>, ServiceError> {
    let scope = match caller {
        Caller::Patient { patient_id: own, .. } if own == patient_id => AccessScope::All,
        Caller::Patient { .. } => {
            return Err(ServiceError::Forbidden("records belong to another patient".into()));
        }
        Caller::Doctor { doctor_id, .. } => {
            if !authorization::is_doctor_authorized_for_patient(conn, doctor_id, patient_id)? {
                return Err(ServiceError::Forbidden("no relationship with this patient".into()));
            }
            authorization::resolve_accessible_resources(conn, doctor_id, patient_id, resource_type, &now)?
        }
    };
    if scope.is_empty() {
        return Ok(Vec::new());
    }

    let resources = owned_resources(conn, patient_id, resource_type)?;
    Ok(resources
        .into_iter()
        .filter(|r| scope.allows(&r.resource_id))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use crate::error::ErrorKind;
    use chrono::TimeZone;
    use crate::invitations;
    use crate::scheduler::{self, NewMedicine, NewPrescription};
    use crate::sharing::{self, ShareRequest};

    #[test]
    fn doctor_sees_only_shared_instances() {
        let conn = test_db();
        let doctor = seed_doctor(&conn, "dr@clinic.io");
        let patient = seed_patient(&conn, "ana@example.com");
        let doc = Caller::doctor(doctor.id, &doctor.email);
        let me = Caller::patient(patient.id, &patient.email);

        let inv = invitations::create_invitation(&conn, &doc, &doctor.id, &patient.email, None, t0()).unwrap();
        invitations::accept_invitation(&conn, &inv.id, &me, t0()).unwrap();

        let a = register_record(&conn, &me, ResourceType::Documents, "MRI", None, t0()).unwrap();
        register_record(&conn, &me, ResourceType::Documents, "Blood panel", None, t0()).unwrap();

        assert!(visible_resources(&conn, &doc, &patient.id, ResourceType::Documents, t0())
            .unwrap()
            .is_empty());

        sharing::share_resource(
            &conn,
            &me,
            &ShareRequest {
                doctor_id: doctor.id,
                resource_type: ResourceType::Documents,
                resource_id: Some(a.id),
                expires_at: None,
                notes: None,
            },
            t0(),
        )
        .unwrap();

        let visible = visible_resources(&conn, &doc, &patient.id, ResourceType::Documents, t0()).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].title, "MRI");

        // The patient always sees both
        let own = visible_resources(&conn, &me, &patient.id, ResourceType::Documents, t0()).unwrap();
        assert_eq!(own.len(), 2);
    }

    #[test]
    fn medications_resolve_through_prescriptions() {
        let conn = test_db();
        let patient = seed_patient(&conn, "ana@example.com");
        let me = Caller::patient(patient.id, &patient.email);
        scheduler::create_prescription(
            &conn,
            &me,
            &NewPrescription {
                prescribing_doctor: None,
                diagnosis: "Flu".into(),
                start_date: t0(),
                end_date: None,
                medicines: vec![NewMedicine {
                    medicine_name: "Oseltamivir".into(),
                    dosage: Some("75mg".into()),
                    frequency_hours: Some(12),
                    duration_days: Some(5),
                    instructions: None,
                }],
            },
            t0(),
        )
        .unwrap();

        let meds = visible_resources(&conn, &me, &patient.id, ResourceType::Medications, t0()).unwrap();
        assert_eq!(meds.len(), 1);
        assert_eq!(meds[0].title, "Oseltamivir");
    }

    #[test]
    fn strangers_are_forbidden() {
        let conn = test_db();
        let doctor = seed_doctor(&conn, "dr@clinic.io");
        let patient = seed_patient(&conn, "ana@example.com");
        let err = visible_resources(
            &conn,
            &Caller::doctor(doctor.id, &doctor.email),
            &patient.id,
            ResourceType::Vaccines,
            t0(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn five_digit_year_record_is_rejected() {
        let conn = test_db();
        let patient = seed_patient(&conn, "ana@example.com");
        let err = register_record(
            &conn,
            &Caller::patient(patient.id, &patient.email),
            ResourceType::Vaccines,
            "Tetanus",
            None,
            Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[test]
    fn prescriptions_cannot_be_registered_as_records() {
        let conn = test_db();
        let patient = seed_patient(&conn, "ana@example.com");
        let err = register_record(
            &conn,
            &Caller::patient(patient.id, &patient.email),
            ResourceType::Prescriptions,
            "Rx",
            None,
            t0(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }
}
