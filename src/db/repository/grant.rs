use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, parse_uuid_opt, OptionalRow};
use crate::db::timestamp;
use crate::db::DatabaseError;
use crate::models::{ResourceGrant, ResourceType};

const GRANT_COLUMNS: &str =
    "id, doctor_id, patient_id, resource_type, resource_id, expires_at, notes, created_at, revoked_at";

pub fn insert_grant(conn: &Connection, grant: &ResourceGrant) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO resource_grants (id, doctor_id, patient_id, resource_type, resource_id,
         expires_at, notes, created_at, revoked_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            grant.id.to_string(),
            grant.doctor_id.to_string(),
            grant.patient_id.to_string(),
            grant.resource_type.as_str(),
            grant.resource_id.map(|id| id.to_string()),
            grant.expires_at.as_ref().map(timestamp::to_db),
            grant.notes,
            timestamp::to_db(&grant.created_at),
            grant.revoked_at.as_ref().map(timestamp::to_db),
        ],
    )?;
    Ok(())
}

pub fn get_grant(conn: &Connection, id: &Uuid) -> Result<Option<ResourceGrant>, DatabaseError> {
    let sql = format!("SELECT {GRANT_COLUMNS} FROM resource_grants WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], grant_row_from_rusqlite)
        .optional()?;
    row.map(grant_from_row).transpose()
}

/// Stamp `revoked_at` on one grant. Already-revoked grants are left untouched.
pub fn revoke_grant(conn: &Connection, id: &Uuid, now: &DateTime<Utc>) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE resource_grants SET revoked_at = ?2 WHERE id = ?1 AND revoked_at IS NULL",
        params![id.to_string(), timestamp::to_db(now)],
    )?;
    Ok(updated)
}

/// Revoke the open grant (if any) with the same doctor, patient, type and
/// instance. `resource_id = None` targets the blanket grant only.
pub fn revoke_open_grant_for_key(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: ResourceType,
    resource_id: Option<&Uuid>,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE resource_grants SET revoked_at = ?5
         WHERE doctor_id = ?1 AND patient_id = ?2 AND resource_type = ?3
           AND COALESCE(resource_id, '*') = COALESCE(?4, '*')
           AND revoked_at IS NULL",
        params![
            doctor_id.to_string(),
            patient_id.to_string(),
            resource_type.as_str(),
            resource_id.map(|id| id.to_string()),
            timestamp::to_db(now),
        ],
    )?;
    Ok(updated)
}

/// Revoke every open grant of a type between one doctor and one patient,
/// blanket and per-instance alike. One statement.
pub fn revoke_grants_of_type(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: ResourceType,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE resource_grants SET revoked_at = ?4
         WHERE doctor_id = ?1 AND patient_id = ?2 AND resource_type = ?3
           AND revoked_at IS NULL",
        params![
            doctor_id.to_string(),
            patient_id.to_string(),
            resource_type.as_str(),
            timestamp::to_db(now),
        ],
    )?;
    Ok(updated)
}

/// Revoke open per-instance grants that point at a deleted resource.
pub fn revoke_grants_for_resource(
    conn: &Connection,
    resource_type: ResourceType,
    resource_id: &Uuid,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE resource_grants SET revoked_at = ?3
         WHERE resource_type = ?1 AND resource_id = ?2 AND revoked_at IS NULL",
        params![resource_type.as_str(), resource_id.to_string(), timestamp::to_db(now)],
    )?;
    Ok(updated)
}

/// Every grant a patient has issued, newest first (revoked included).
pub fn list_grants_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<ResourceGrant>, DatabaseError> {
    let sql = format!(
        "SELECT {GRANT_COLUMNS} FROM resource_grants WHERE patient_id = ?1 ORDER BY created_at DESC"
    );
    query_grants(conn, &sql, params![patient_id.to_string()])
}

/// Every grant a doctor has received, newest first (revoked included).
pub fn list_grants_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<ResourceGrant>, DatabaseError> {
    let sql = format!(
        "SELECT {GRANT_COLUMNS} FROM resource_grants WHERE doctor_id = ?1 ORDER BY created_at DESC"
    );
    query_grants(conn, &sql, params![doctor_id.to_string()])
}

/// Grants in force at `now` for (doctor, patient, type).
///
/// Gated on an accepted invitation in the same statement, so a grant whose
/// relationship was never established (or is gone) yields nothing.
pub fn list_effective_grants(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
    resource_type: ResourceType,
    now: &DateTime<Utc>,
) -> Result<Vec<ResourceGrant>, DatabaseError> {
    let sql = format!(
        "SELECT {GRANT_COLUMNS} FROM resource_grants g
         WHERE g.doctor_id = ?1 AND g.patient_id = ?2 AND g.resource_type = ?3
           AND g.revoked_at IS NULL
           AND (g.expires_at IS NULL OR g.expires_at > ?4)
           AND EXISTS (
               SELECT 1 FROM invitations i
               WHERE i.doctor_id = g.doctor_id AND i.patient_id = g.patient_id
                 AND i.status = 'accepted'
           )
         ORDER BY g.created_at"
    );
    query_grants(
        conn,
        &sql,
        params![
            doctor_id.to_string(),
            patient_id.to_string(),
            resource_type.as_str(),
            timestamp::to_db(now),
        ],
    )
}

fn query_grants(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<ResourceGrant>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, grant_row_from_rusqlite)?;

    let mut grants = Vec::new();
    for row in rows {
        grants.push(grant_from_row(row?)?);
    }
    Ok(grants)
}

struct GrantRow {
    id: String,
    doctor_id: String,
    patient_id: String,
    resource_type: String,
    resource_id: Option<String>,
    expires_at: Option<String>,
    notes: Option<String>,
    created_at: String,
    revoked_at: Option<String>,
}

fn grant_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<GrantRow, rusqlite::Error> {
    Ok(GrantRow {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_id: row.get(2)?,
        resource_type: row.get(3)?,
        resource_id: row.get(4)?,
        expires_at: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        revoked_at: row.get(8)?,
    })
}

fn grant_from_row(row: GrantRow) -> Result<ResourceGrant, DatabaseError> {
    Ok(ResourceGrant {
        id: parse_uuid("resource_grants.id", &row.id)?,
        doctor_id: parse_uuid("resource_grants.doctor_id", &row.doctor_id)?,
        patient_id: parse_uuid("resource_grants.patient_id", &row.patient_id)?,
        resource_type: ResourceType::from_str(&row.resource_type)?,
        resource_id: parse_uuid_opt("resource_grants.resource_id", row.resource_id)?,
        expires_at: timestamp::from_db_opt("resource_grants.expires_at", row.expires_at)?,
        notes: row.notes,
        created_at: timestamp::from_db("resource_grants.created_at", &row.created_at)?,
        revoked_at: timestamp::from_db_opt("resource_grants.revoked_at", row.revoked_at)?,
    })
}
