use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, OptionalRow};
use crate::db::timestamp;
use crate::db::DatabaseError;
use crate::models::{Doctor, Patient};

pub fn insert_doctor(conn: &Connection, doctor: &Doctor) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO doctors (id, email, full_name, specialty, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            doctor.id.to_string(),
            doctor.email,
            doctor.full_name,
            doctor.specialty,
            timestamp::to_db(&doctor.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_doctor(conn: &Connection, id: &Uuid) -> Result<Option<Doctor>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, email, full_name, specialty, created_at FROM doctors WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, email, full_name, specialty, created_at)| -> Result<Doctor, DatabaseError> {
        Ok(Doctor {
            id: parse_uuid("doctors.id", &id)?,
            email,
            full_name,
            specialty,
            created_at: timestamp::from_db("doctors.created_at", &created_at)?,
        })
    })
    .transpose()
}

pub fn insert_patient(conn: &Connection, patient: &Patient) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO patients (id, email, full_name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            patient.id.to_string(),
            patient.email,
            patient.full_name,
            timestamp::to_db(&patient.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Option<Patient>, DatabaseError> {
    query_patient(conn, "WHERE id = ?1", &id.to_string())
}

/// Look a patient up by (normalized) email.
pub fn find_patient_by_email(conn: &Connection, email: &str) -> Result<Option<Patient>, DatabaseError> {
    query_patient(conn, "WHERE email = ?1", email)
}

fn query_patient(conn: &Connection, filter: &str, value: &str) -> Result<Option<Patient>, DatabaseError> {
    let sql = format!("SELECT id, email, full_name, created_at FROM patients {filter}");
    let row = conn
        .query_row(&sql, params![value], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .optional()?;

    row.map(|(id, email, full_name, created_at)| -> Result<Patient, DatabaseError> {
        Ok(Patient {
            id: parse_uuid("patients.id", &id)?,
            email,
            full_name,
            created_at: timestamp::from_db("patients.created_at", &created_at)?,
        })
    })
    .transpose()
}
