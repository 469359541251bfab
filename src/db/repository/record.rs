use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, OptionalRow};
use crate::db::timestamp;
use crate::db::DatabaseError;
use crate::models::{PatientRecord, ResourceType};

pub fn insert_record(conn: &Connection, record: &PatientRecord) -> Result<(), DatabaseError> {
    if !record.resource_type.is_patient_record() {
        return Err(DatabaseError::ConstraintViolation(format!(
            "{} are not stored as patient records",
            record.resource_type
        )));
    }
    conn.execute(
        "INSERT INTO patient_records (id, patient_id, resource_type, title, detail, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id.to_string(),
            record.patient_id.to_string(),
            record.resource_type.as_str(),
            record.title,
            record.detail,
            timestamp::to_db(&record.recorded_at),
        ],
    )?;
    Ok(())
}

pub fn get_record(conn: &Connection, id: &Uuid) -> Result<Option<PatientRecord>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, patient_id, resource_type, title, detail, recorded_at
             FROM patient_records WHERE id = ?1",
            params![id.to_string()],
            record_row_from_rusqlite,
        )
        .optional()?;
    row.map(record_from_row).transpose()
}

/// Records of one type owned by a patient, newest first.
pub fn list_records(
    conn: &Connection,
    patient_id: &Uuid,
    resource_type: ResourceType,
) -> Result<Vec<PatientRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, resource_type, title, detail, recorded_at
         FROM patient_records WHERE patient_id = ?1 AND resource_type = ?2
         ORDER BY recorded_at DESC",
    )?;
    let rows = stmt.query_map(
        params![patient_id.to_string(), resource_type.as_str()],
        record_row_from_rusqlite,
    )?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

/// Whether `resource_id` is an instance of `resource_type` owned by the patient.
///
/// Prescriptions and medications resolve against their own tables; the
/// remaining types live in `patient_records`.
pub fn patient_owns_resource(
    conn: &Connection,
    patient_id: &Uuid,
    resource_type: ResourceType,
    resource_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let sql = match resource_type {
        ResourceType::Prescriptions => {
            "SELECT COUNT(*) > 0 FROM prescriptions WHERE id = ?1 AND patient_id = ?2"
        }
        ResourceType::Medications => {
            "SELECT COUNT(*) > 0 FROM prescription_medicines pm
             JOIN prescriptions p ON p.id = pm.prescription_id
             WHERE pm.id = ?1 AND p.patient_id = ?2"
        }
        _ => {
            "SELECT COUNT(*) > 0 FROM patient_records
             WHERE id = ?1 AND patient_id = ?2 AND resource_type = ?3"
        }
    };

    let owned = if resource_type.is_patient_record() {
        conn.query_row(
            sql,
            params![resource_id.to_string(), patient_id.to_string(), resource_type.as_str()],
            |row| row.get::<_, bool>(0),
        )?
    } else {
        conn.query_row(
            sql,
            params![resource_id.to_string(), patient_id.to_string()],
            |row| row.get::<_, bool>(0),
        )?
    };
    Ok(owned)
}

struct RecordRow {
    id: String,
    patient_id: String,
    resource_type: String,
    title: String,
    detail: Option<String>,
    recorded_at: String,
}

fn record_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<RecordRow, rusqlite::Error> {
    Ok(RecordRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        resource_type: row.get(2)?,
        title: row.get(3)?,
        detail: row.get(4)?,
        recorded_at: row.get(5)?,
    })
}

fn record_from_row(row: RecordRow) -> Result<PatientRecord, DatabaseError> {
    Ok(PatientRecord {
        id: parse_uuid("patient_records.id", &row.id)?,
        patient_id: parse_uuid("patient_records.patient_id", &row.patient_id)?,
        resource_type: ResourceType::from_str(&row.resource_type)?,
        title: row.title,
        detail: row.detail,
        recorded_at: timestamp::from_db("patient_records.recorded_at", &row.recorded_at)?,
    })
}
