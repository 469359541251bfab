//! Prescription scheduling: expands each medicine of a prescription into
//! timed doses and anchors one reminder alert at the earliest upcoming dose.
//!
//! Doses fall at `start + k * frequency_hours` for k = 0, 1, … while
//! `k * frequency_hours < duration_days * 24`. A medicine without frequency
//! or duration yields no doses. Prescription, medicines and doses are
//! written in one transaction; the alert is written afterwards and a
//! failure there is logged, not returned.

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use serde::Serialize;
use uuid::Uuid;

use crate::authorization;
use crate::db::{repository, timestamp};
use crate::error::{ensure_storable, ServiceError};
use crate::identity::Caller;
use crate::models::{
    AlertRelatedType, CustomAlert, DoseStatus, MedicationDose, Prescription, PrescriptionMedicine,
    ResourceType,
};

/// Upper bound on generated doses for a single medicine.
pub const MAX_DOSES_PER_MEDICINE: i64 = 5000;

/// Medicine line of a new prescription.
#[derive(Debug, Clone)]
pub struct NewMedicine {
    pub medicine_name: String,
    pub dosage: Option<String>,
    pub frequency_hours: Option<i64>,
    pub duration_days: Option<i64>,
    pub instructions: Option<String>,
}

/// A prescription as entered by the patient.
#[derive(Debug, Clone)]
pub struct NewPrescription {
    pub prescribing_doctor: Option<String>,
    pub diagnosis: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub medicines: Vec<NewMedicine>,
}

/// Everything written for one prescription.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescriptionSchedule {
    pub prescription: Prescription,
    pub medicines: Vec<PrescriptionMedicine>,
    pub doses: Vec<MedicationDose>,
    pub alert: Option<CustomAlert>,
}

// ═══════════════════════════════════════════════════════════
// Dose expansion
// ═══════════════════════════════════════════════════════════

/// Number of doses a medicine produces. Both values must already be
/// validated positive.
fn dose_count(frequency_hours: i64, duration_days: i64) -> Option<i64> {
    let window_hours = duration_days.checked_mul(24)?;
    // ceil(window / frequency): k ranges over 0..count with k*freq < window
    Some(window_hours.checked_add(frequency_hours - 1)? / frequency_hours)
}

/// Instant of dose `k`, or `None` past chrono's calendar range.
fn dose_at(start: DateTime<Utc>, frequency_hours: i64, k: i64) -> Option<DateTime<Utc>> {
    let offset = Duration::try_hours(k.checked_mul(frequency_hours)?)?;
    start.checked_add_signed(offset)
}

/// Scheduled instants for one medicine, in order.
pub fn dose_times(
    start: DateTime<Utc>,
    frequency_hours: Option<i64>,
    duration_days: Option<i64>,
) -> Vec<DateTime<Utc>> {
    let (Some(freq), Some(days)) = (frequency_hours, duration_days) else {
        return Vec::new();
    };
    if freq <= 0 || days <= 0 {
        return Vec::new();
    }
    let count = dose_count(freq, days).unwrap_or(0).min(MAX_DOSES_PER_MEDICINE);
    (0..count).map_while(|k| dose_at(start, freq, k)).collect()
}

fn validate_medicine(med: &NewMedicine, start: DateTime<Utc>) -> Result<(), ServiceError> {
    if med.medicine_name.trim().is_empty() {
        return Err(ServiceError::Validation("medicine name is required".into()));
    }
    if med.frequency_hours.is_some_and(|f| f <= 0) {
        return Err(ServiceError::Validation(format!(
            "{}: frequency must be a positive number of hours",
            med.medicine_name
        )));
    }
    if med.duration_days.is_some_and(|d| d <= 0) {
        return Err(ServiceError::Validation(format!(
            "{}: duration must be a positive number of days",
            med.medicine_name
        )));
    }
    if let (Some(freq), Some(days)) = (med.frequency_hours, med.duration_days) {
        let too_many = dose_count(freq, days).map_or(true, |n| n > MAX_DOSES_PER_MEDICINE);
        if too_many {
            return Err(ServiceError::Validation(format!(
                "{}: schedule exceeds {MAX_DOSES_PER_MEDICINE} doses",
                med.medicine_name
            )));
        }
        let last = dose_count(freq, days).and_then(|n| dose_at(start, freq, n - 1));
        if !last.is_some_and(|at| timestamp::is_storable(&at)) {
            return Err(ServiceError::Validation(format!(
                "{}: schedule runs past the supported date range",
                med.medicine_name
            )));
        }
    }
    Ok(())
}

fn validate_prescription(input: &NewPrescription) -> Result<(), ServiceError> {
    if input.diagnosis.trim().is_empty() {
        return Err(ServiceError::Validation("diagnosis is required".into()));
    }
    if input.medicines.is_empty() {
        return Err(ServiceError::Validation("at least one medicine is required".into()));
    }
    ensure_storable("startDate", &input.start_date)?;
    if let Some(end) = &input.end_date {
        ensure_storable("endDate", end)?;
    }
    if input.end_date.is_some_and(|end| end < input.start_date) {
        return Err(ServiceError::Validation("end date precedes start date".into()));
    }
    input
        .medicines
        .iter()
        .try_for_each(|med| validate_medicine(med, input.start_date))
}

fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ═══════════════════════════════════════════════════════════
// Creation / deletion
// ═══════════════════════════════════════════════════════════

/// Persist a prescription for the calling patient together with its
/// dose schedule, then create the reminder alert.
pub fn create_prescription(
    conn: &Connection,
    caller: &Caller,
    input: &NewPrescription,
    now: DateTime<Utc>,
) -> Result<PrescriptionSchedule, ServiceError> {
    let patient_id = caller.require_patient()?;
    validate_prescription(input)?;

    let prescription = Prescription {
        id: Uuid::new_v4(),
        patient_id,
        prescribing_doctor: trimmed(&input.prescribing_doctor),
        diagnosis: input.diagnosis.trim().to_string(),
        start_date: input.start_date,
        end_date: input.end_date,
        created_at: now,
    };

    let mut medicines = Vec::with_capacity(input.medicines.len());
    let mut doses = Vec::new();
    for line in &input.medicines {
        let medicine = PrescriptionMedicine {
            id: Uuid::new_v4(),
            prescription_id: prescription.id,
            medicine_name: line.medicine_name.trim().to_string(),
            dosage: trimmed(&line.dosage),
            frequency_hours: line.frequency_hours,
            duration_days: line.duration_days,
            instructions: trimmed(&line.instructions),
        };
        for scheduled_at in dose_times(input.start_date, line.frequency_hours, line.duration_days) {
            doses.push(MedicationDose {
                id: Uuid::new_v4(),
                prescription_medicine_id: medicine.id,
                scheduled_at,
                status: DoseStatus::Pending,
            });
        }
        medicines.push(medicine);
    }

    let tx = conn.unchecked_transaction()?;
    repository::insert_prescription(&tx, &prescription)?;
    for medicine in &medicines {
        repository::insert_medicine(&tx, medicine)?;
    }
    for dose in &doses {
        repository::insert_dose(&tx, dose)?;
    }
    tx.commit()?;

    doses.sort_by_key(|d| d.scheduled_at);
    tracing::info!(
        prescription_id = %prescription.id,
        medicines = medicines.len(),
        doses = doses.len(),
        "Prescription scheduled"
    );

    let alert = next_dose_alert(&prescription, &medicines, &doses, now);
    let alert = match alert {
        Some(alert) => match repository::insert_alert(conn, &alert) {
            Ok(()) => Some(alert),
            Err(e) => {
                tracing::warn!(
                    prescription_id = %prescription.id,
                    error = %e,
                    "Failed to create dose reminder"
                );
                None
            }
        },
        None => None,
    };

    Ok(PrescriptionSchedule {
        prescription,
        medicines,
        doses,
        alert,
    })
}

/// Alert for the earliest dose at or after `now`. `doses` must be sorted.
fn next_dose_alert(
    prescription: &Prescription,
    medicines: &[PrescriptionMedicine],
    doses: &[MedicationDose],
    now: DateTime<Utc>,
) -> Option<CustomAlert> {
    let next = doses.iter().find(|d| d.scheduled_at >= now)?;
    let name = medicines
        .iter()
        .find(|m| m.id == next.prescription_medicine_id)
        .map_or(prescription.diagnosis.as_str(), |m| m.medicine_name.as_str());

    Some(CustomAlert {
        id: Uuid::new_v4(),
        patient_id: prescription.patient_id,
        related_id: prescription.id,
        related_type: AlertRelatedType::Prescription,
        title: format!("Next dose: {name}"),
        trigger_date: next.scheduled_at,
        is_read: false,
        created_at: now,
    })
}

/// Delete one of the caller's prescriptions with its medicines, doses and
/// alerts. Open grants pointing at the prescription or its medicines are
/// revoked in the same transaction.
pub fn delete_prescription(
    conn: &Connection,
    caller: &Caller,
    prescription_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let patient_id = caller.require_patient()?;
    let prescription = repository::get_prescription(conn, prescription_id)?
        .ok_or_else(|| ServiceError::not_found("prescription", prescription_id))?;
    if prescription.patient_id != patient_id {
        return Err(ServiceError::Forbidden("prescription belongs to another patient".into()));
    }
    let medicines = repository::list_medicines(conn, prescription_id)?;

    let tx = conn.unchecked_transaction()?;
    let mut revoked =
        repository::revoke_grants_for_resource(&tx, ResourceType::Prescriptions, prescription_id, &now)?;
    for medicine in &medicines {
        revoked += repository::revoke_grants_for_resource(&tx, ResourceType::Medications, &medicine.id, &now)?;
    }
    let alerts = repository::delete_alerts_for_related(&tx, AlertRelatedType::Prescription, prescription_id)?;
    repository::delete_prescription(&tx, prescription_id)?;
    tx.commit()?;

    tracing::info!(
        prescription_id = %prescription_id,
        revoked_shares = revoked,
        alerts_removed = alerts,
        "Prescription deleted"
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Dose tracking
// ═══════════════════════════════════════════════════════════

/// Prescriptions owned by the calling patient.
pub fn list_prescriptions(conn: &Connection, caller: &Caller) -> Result<Vec<Prescription>, ServiceError> {
    let patient_id = caller.require_patient()?;
    Ok(repository::list_prescriptions_for_patient(conn, &patient_id)?)
}

/// Doses of a prescription, readable by its owner and by doctors the
/// prescription has been shared with.
pub fn list_doses(
    conn: &Connection,
    caller: &Caller,
    prescription_id: &Uuid,
    now: DateTime<Utc>,
) -> Result<Vec<MedicationDose>, ServiceError> {
    let prescription = repository::get_prescription(conn, prescription_id)?
        .ok_or_else(|| ServiceError::not_found("prescription", prescription_id))?;

    match caller {
        Caller::Patient { patient_id, .. } if *patient_id == prescription.patient_id => {}
        Caller::Doctor { doctor_id, .. } => {
            let decision = authorization::check_resource_access(
                conn,
                doctor_id,
                &prescription.patient_id,
                ResourceType::Prescriptions,
                Some(prescription_id),
                &now,
            )?;
            if !decision.allowed {
                return Err(ServiceError::Forbidden("prescription has not been shared".into()));
            }
        }
        Caller::Patient { .. } => {
            return Err(ServiceError::Forbidden("prescription belongs to another patient".into()));
        }
    }
    Ok(repository::list_doses_for_prescription(conn, prescription_id)?)
}

/// Record a dose as taken or missed.
pub fn record_dose_status(
    conn: &Connection,
    caller: &Caller,
    dose_id: &Uuid,
    status: DoseStatus,
    now: DateTime<Utc>,
) -> Result<MedicationDose, ServiceError> {
    let patient_id = caller.require_patient()?;
    if status == DoseStatus::Pending {
        return Err(ServiceError::Validation("dose status must be taken or missed".into()));
    }
    let owner = repository::get_dose_owner(conn, dose_id)?
        .ok_or_else(|| ServiceError::not_found("dose", dose_id))?;
    if owner != patient_id {
        return Err(ServiceError::Forbidden("dose belongs to another patient".into()));
    }

    repository::update_dose_status(conn, dose_id, status, &now)?;
    repository::get_dose(conn, dose_id)?.ok_or_else(|| ServiceError::not_found("dose", dose_id))
}

/// Sweep: pending doses older than `now - grace` become missed.
pub fn mark_missed_doses(conn: &Connection, now: DateTime<Utc>, grace: Duration) -> Result<usize, ServiceError> {
    let cutoff = now - grace;
    let missed = repository::mark_missed_doses(conn, &cutoff, &now)?;
    if missed > 0 {
        tracing::info!(count = missed, "Marked overdue doses as missed");
    }
    Ok(missed)
}

// ═══════════════════════════════════════════════════════════
// Alerts
// ═══════════════════════════════════════════════════════════

pub fn list_alerts(
    conn: &Connection,
    caller: &Caller,
    unread_only: bool,
) -> Result<Vec<CustomAlert>, ServiceError> {
    let patient_id = caller.require_patient()?;
    Ok(repository::list_alerts_for_patient(conn, &patient_id, unread_only)?)
}

pub fn mark_alert_read(conn: &Connection, caller: &Caller, alert_id: &Uuid) -> Result<(), ServiceError> {
    let patient_id = caller.require_patient()?;
    if repository::mark_alert_read(conn, alert_id, &patient_id)? == 0 {
        return Err(ServiceError::not_found("alert", alert_id));
    }
    Ok(())
}
