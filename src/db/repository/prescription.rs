use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, OptionalRow};
use crate::db::timestamp;
use crate::db::DatabaseError;
use crate::models::{DoseStatus, MedicationDose, Prescription, PrescriptionMedicine};

// ═══════════════════════════════════════════
// Prescriptions
// ═══════════════════════════════════════════

pub fn insert_prescription(conn: &Connection, rx: &Prescription) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, patient_id, prescribing_doctor, diagnosis, start_date,
         end_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            rx.id.to_string(),
            rx.patient_id.to_string(),
            rx.prescribing_doctor,
            rx.diagnosis,
            timestamp::to_db(&rx.start_date),
            rx.end_date.as_ref().map(timestamp::to_db),
            timestamp::to_db(&rx.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_prescription(conn: &Connection, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, prescribing_doctor, diagnosis, start_date, end_date, created_at
             FROM prescriptions WHERE id = ?1",
            params![id.to_string()],
            prescription_row_from_rusqlite,
        )
        .optional()?;
    row.map(prescription_from_row).transpose()
}

pub fn list_prescriptions_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, prescribing_doctor, diagnosis, start_date, end_date, created_at
         FROM prescriptions WHERE patient_id = ?1 ORDER BY start_date DESC",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], prescription_row_from_rusqlite)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(row?)?);
    }
    Ok(prescriptions)
}

/// Delete a prescription; medicines and doses go with it via ON DELETE CASCADE.
pub fn delete_prescription(conn: &Connection, id: &Uuid) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM prescriptions WHERE id = ?1",
        params![id.to_string()],
    )?;
    Ok(deleted)
}

struct PrescriptionRow {
    id: String,
    patient_id: String,
    prescribing_doctor: Option<String>,
    diagnosis: String,
    start_date: String,
    end_date: Option<String>,
    created_at: String,
}

fn prescription_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<PrescriptionRow, rusqlite::Error> {
    Ok(PrescriptionRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        prescribing_doctor: row.get(2)?,
        diagnosis: row.get(3)?,
        start_date: row.get(4)?,
        end_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: parse_uuid("prescriptions.id", &row.id)?,
        patient_id: parse_uuid("prescriptions.patient_id", &row.patient_id)?,
        prescribing_doctor: row.prescribing_doctor,
        diagnosis: row.diagnosis,
        start_date: timestamp::from_db("prescriptions.start_date", &row.start_date)?,
        end_date: timestamp::from_db_opt("prescriptions.end_date", row.end_date)?,
        created_at: timestamp::from_db("prescriptions.created_at", &row.created_at)?,
    })
}

// ═══════════════════════════════════════════
// Medicines
// ═══════════════════════════════════════════

pub fn insert_medicine(conn: &Connection, med: &PrescriptionMedicine) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescription_medicines (id, prescription_id, medicine_name, dosage,
         frequency_hours, duration_days, instructions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            med.id.to_string(),
            med.prescription_id.to_string(),
            med.medicine_name,
            med.dosage,
            med.frequency_hours,
            med.duration_days,
            med.instructions,
        ],
    )?;
    Ok(())
}

pub fn list_medicines(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<PrescriptionMedicine>, DatabaseError> {
    query_medicines(
        conn,
        "SELECT id, prescription_id, medicine_name, dosage, frequency_hours, duration_days, instructions
         FROM prescription_medicines WHERE prescription_id = ?1 ORDER BY rowid",
        &prescription_id.to_string(),
    )
}

/// Every medicine across a patient's prescriptions.
pub fn list_medicines_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<PrescriptionMedicine>, DatabaseError> {
    query_medicines(
        conn,
        "SELECT pm.id, pm.prescription_id, pm.medicine_name, pm.dosage, pm.frequency_hours,
                pm.duration_days, pm.instructions
         FROM prescription_medicines pm
         JOIN prescriptions p ON p.id = pm.prescription_id
         WHERE p.patient_id = ?1
         ORDER BY p.start_date DESC, pm.rowid",
        &patient_id.to_string(),
    )
}

fn query_medicines(
    conn: &Connection,
    sql: &str,
    value: &str,
) -> Result<Vec<PrescriptionMedicine>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![value], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<i64>>(4)?,
            row.get::<_, Option<i64>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut medicines = Vec::new();
    for row in rows {
        let (id, prescription_id, medicine_name, dosage, frequency_hours, duration_days, instructions) =
            row?;
        medicines.push(PrescriptionMedicine {
            id: parse_uuid("prescription_medicines.id", &id)?,
            prescription_id: parse_uuid("prescription_medicines.prescription_id", &prescription_id)?,
            medicine_name,
            dosage,
            frequency_hours,
            duration_days,
            instructions,
        });
    }
    Ok(medicines)
}

// ═══════════════════════════════════════════
// Doses
// ═══════════════════════════════════════════

pub fn insert_dose(conn: &Connection, dose: &MedicationDose) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_doses (id, prescription_medicine_id, scheduled_at, status)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            dose.id.to_string(),
            dose.prescription_medicine_id.to_string(),
            timestamp::to_db(&dose.scheduled_at),
            dose.status.as_str(),
        ],
    )?;
    Ok(())
}

pub fn get_dose(conn: &Connection, id: &Uuid) -> Result<Option<MedicationDose>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, prescription_medicine_id, scheduled_at, status
             FROM medication_doses WHERE id = ?1",
            params![id.to_string()],
            dose_row_from_rusqlite,
        )
        .optional()?;
    row.map(dose_from_row).transpose()
}

/// Doses of every medicine in a prescription, in schedule order.
pub fn list_doses_for_prescription(
    conn: &Connection,
    prescription_id: &Uuid,
) -> Result<Vec<MedicationDose>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.prescription_medicine_id, d.scheduled_at, d.status
         FROM medication_doses d
         JOIN prescription_medicines pm ON pm.id = d.prescription_medicine_id
         WHERE pm.prescription_id = ?1
         ORDER BY d.scheduled_at, pm.rowid",
    )?;
    let rows = stmt.query_map(params![prescription_id.to_string()], dose_row_from_rusqlite)?;

    let mut doses = Vec::new();
    for row in rows {
        doses.push(dose_from_row(row?)?);
    }
    Ok(doses)
}

/// Patient owning the prescription a dose belongs to.
pub fn get_dose_owner(conn: &Connection, dose_id: &Uuid) -> Result<Option<Uuid>, DatabaseError> {
    let owner = conn
        .query_row(
            "SELECT p.patient_id FROM medication_doses d
             JOIN prescription_medicines pm ON pm.id = d.prescription_medicine_id
             JOIN prescriptions p ON p.id = pm.prescription_id
             WHERE d.id = ?1",
            params![dose_id.to_string()],
            |row| row.get::<_, String>(0),
        )
        .optional()?;
    owner
        .map(|id| parse_uuid("prescriptions.patient_id", &id))
        .transpose()
}

pub fn update_dose_status(
    conn: &Connection,
    dose_id: &Uuid,
    status: DoseStatus,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE medication_doses SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![dose_id.to_string(), status.as_str(), timestamp::to_db(now)],
    )?;
    Ok(updated)
}

/// Flip every pending dose scheduled before `cutoff` to missed.
pub fn mark_missed_doses(
    conn: &Connection,
    cutoff: &DateTime<Utc>,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE medication_doses SET status = 'missed', updated_at = ?2
         WHERE status = 'pending' AND scheduled_at < ?1",
        params![timestamp::to_db(cutoff), timestamp::to_db(now)],
    )?;
    Ok(updated)
}

struct DoseRow {
    id: String,
    prescription_medicine_id: String,
    scheduled_at: String,
    status: String,
}

fn dose_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<DoseRow, rusqlite::Error> {
    Ok(DoseRow {
        id: row.get(0)?,
        prescription_medicine_id: row.get(1)?,
        scheduled_at: row.get(2)?,
        status: row.get(3)?,
    })
}

fn dose_from_row(row: DoseRow) -> Result<MedicationDose, DatabaseError> {
    Ok(MedicationDose {
        id: parse_uuid("medication_doses.id", &row.id)?,
        prescription_medicine_id: parse_uuid(
            "medication_doses.prescription_medicine_id",
            &row.prescription_medicine_id,
        )?,
        scheduled_at: timestamp::from_db("medication_doses.scheduled_at", &row.scheduled_at)?,
        status: DoseStatus::from_str(&row.status)?,
    })
}
