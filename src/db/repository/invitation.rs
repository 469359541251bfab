use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, parse_uuid_opt, OptionalRow};
use crate::db::timestamp;
use crate::db::DatabaseError;
use crate::models::{DoctorPatientRelationship, Invitation, InvitationStatus};

const INVITATION_COLUMNS: &str =
    "id, doctor_id, patient_email, patient_id, status, message, created_at, updated_at, expires_at";

pub fn insert_invitation(conn: &Connection, inv: &Invitation) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO invitations (id, doctor_id, patient_email, patient_id, status, message,
         created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            inv.id.to_string(),
            inv.doctor_id.to_string(),
            inv.patient_email,
            inv.patient_id.map(|id| id.to_string()),
            inv.status.as_str(),
            inv.message,
            timestamp::to_db(&inv.created_at),
            timestamp::to_db(&inv.updated_at),
            timestamp::to_db(&inv.expires_at),
        ],
    )?;
    Ok(())
}

pub fn get_invitation(conn: &Connection, id: &Uuid) -> Result<Option<Invitation>, DatabaseError> {
    let sql = format!("SELECT {INVITATION_COLUMNS} FROM invitations WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_string()], invitation_row_from_rusqlite)
        .optional()?;
    row.map(invitation_from_row).transpose()
}

/// All invitations sent by a doctor, newest first. Stored statuses only.
pub fn list_invitations_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<Invitation>, DatabaseError> {
    let sql = format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations WHERE doctor_id = ?1 ORDER BY created_at DESC"
    );
    query_invitations(conn, &sql, params![doctor_id.to_string()])
}

/// Invitations addressed to an email or already bound to a patient id.
pub fn list_invitations_for_patient(
    conn: &Connection,
    patient_email: &str,
    patient_id: Option<&Uuid>,
) -> Result<Vec<Invitation>, DatabaseError> {
    let sql = format!(
        "SELECT {INVITATION_COLUMNS} FROM invitations
         WHERE patient_email = ?1 OR (?2 IS NOT NULL AND patient_id = ?2)
         ORDER BY created_at DESC"
    );
    query_invitations(
        conn,
        &sql,
        params![patient_email, patient_id.map(|id| id.to_string())],
    )
}

/// Materialise lapsed pending invitations for one doctor/email pair as expired.
pub fn expire_lapsed_for_pair(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_email: &str,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    let now = timestamp::to_db(now);
    let updated = conn.execute(
        "UPDATE invitations SET status = 'expired', updated_at = ?3
         WHERE doctor_id = ?1 AND patient_email = ?2
           AND status = 'pending' AND expires_at < ?3",
        params![doctor_id.to_string(), patient_email, now],
    )?;
    Ok(updated)
}

/// Sweep: materialise every lapsed pending invitation as expired.
pub fn expire_lapsed_invitations(conn: &Connection, now: &DateTime<Utc>) -> Result<usize, DatabaseError> {
    let now = timestamp::to_db(now);
    let updated = conn.execute(
        "UPDATE invitations SET status = 'expired', updated_at = ?1
         WHERE status = 'pending' AND expires_at < ?1",
        params![now],
    )?;
    Ok(updated)
}

/// Whether the doctor already has an accepted invitation for this email.
pub fn has_accepted_invitation_for_email(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_email: &str,
) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT COUNT(*) > 0 FROM invitations
         WHERE doctor_id = ?1 AND patient_email = ?2 AND status = 'accepted'",
        params![doctor_id.to_string(), patient_email],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

/// Move a pending, unexpired invitation to `accepted` or `rejected`.
///
/// Single conditional update: succeeds only while the row is still pending,
/// not past `expires_at`, and unbound or bound to the same patient.
/// Returns the number of rows changed (0 or 1).
pub fn resolve_pending_invitation(
    conn: &Connection,
    id: &Uuid,
    patient_id: &Uuid,
    status: InvitationStatus,
    now: &DateTime<Utc>,
) -> Result<usize, DatabaseError> {
    if !matches!(status, InvitationStatus::Accepted | InvitationStatus::Rejected) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "cannot resolve invitation to {status}"
        )));
    }
    let now = timestamp::to_db(now);
    let updated = conn.execute(
        "UPDATE invitations SET status = ?3, patient_id = ?2, updated_at = ?4
         WHERE id = ?1 AND status = 'pending' AND expires_at >= ?4
           AND (patient_id IS NULL OR patient_id = ?2)",
        params![id.to_string(), patient_id.to_string(), status.as_str(), now],
    )?;
    Ok(updated)
}

/// True iff an accepted invitation links the doctor and the patient.
pub fn has_accepted_relationship(
    conn: &Connection,
    doctor_id: &Uuid,
    patient_id: &Uuid,
) -> Result<bool, DatabaseError> {
    let exists = conn.query_row(
        "SELECT COUNT(*) > 0 FROM invitations
         WHERE doctor_id = ?1 AND patient_id = ?2 AND status = 'accepted'",
        params![doctor_id.to_string(), patient_id.to_string()],
        |row| row.get::<_, bool>(0),
    )?;
    Ok(exists)
}

/// Relationships of a doctor (one per patient, earliest acceptance).
pub fn list_relationships_for_doctor(
    conn: &Connection,
    doctor_id: &Uuid,
) -> Result<Vec<DoctorPatientRelationship>, DatabaseError> {
    query_relationships(conn, "i.doctor_id = ?1", &doctor_id.to_string())
}

/// Relationships of a patient (one per doctor, earliest acceptance).
pub fn list_relationships_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<DoctorPatientRelationship>, DatabaseError> {
    query_relationships(conn, "i.patient_id = ?1", &patient_id.to_string())
}

fn query_relationships(
    conn: &Connection,
    filter: &str,
    value: &str,
) -> Result<Vec<DoctorPatientRelationship>, DatabaseError> {
    let sql = format!(
        "SELECT i.doctor_id, d.full_name, i.patient_id, p.full_name, i.id, MIN(i.updated_at)
         FROM invitations i
         JOIN doctors d ON d.id = i.doctor_id
         JOIN patients p ON p.id = i.patient_id
         WHERE i.status = 'accepted' AND {filter}
         GROUP BY i.doctor_id, i.patient_id
         ORDER BY d.full_name, p.full_name"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![value], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut relationships = Vec::new();
    for row in rows {
        let (doctor_id, doctor_name, patient_id, patient_name, invitation_id, since) = row?;
        relationships.push(DoctorPatientRelationship {
            doctor_id: parse_uuid("invitations.doctor_id", &doctor_id)?,
            doctor_name,
            patient_id: parse_uuid("invitations.patient_id", &patient_id)?,
            patient_name,
            invitation_id: parse_uuid("invitations.id", &invitation_id)?,
            since: timestamp::from_db("invitations.updated_at", &since)?,
        });
    }
    Ok(relationships)
}

fn query_invitations(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Invitation>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, invitation_row_from_rusqlite)?;

    let mut invitations = Vec::new();
    for row in rows {
        invitations.push(invitation_from_row(row?)?);
    }
    Ok(invitations)
}

// Internal row type for Invitation mapping
struct InvitationRow {
    id: String,
    doctor_id: String,
    patient_email: String,
    patient_id: Option<String>,
    status: String,
    message: Option<String>,
    created_at: String,
    updated_at: String,
    expires_at: String,
}

fn invitation_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<InvitationRow, rusqlite::Error> {
    Ok(InvitationRow {
        id: row.get(0)?,
        doctor_id: row.get(1)?,
        patient_email: row.get(2)?,
        patient_id: row.get(3)?,
        status: row.get(4)?,
        message: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

fn invitation_from_row(row: InvitationRow) -> Result<Invitation, DatabaseError> {
    Ok(Invitation {
        id: parse_uuid("invitations.id", &row.id)?,
        doctor_id: parse_uuid("invitations.doctor_id", &row.doctor_id)?,
        patient_email: row.patient_email,
        patient_id: parse_uuid_opt("invitations.patient_id", row.patient_id)?,
        status: InvitationStatus::from_str(&row.status)?,
        message: row.message,
        created_at: timestamp::from_db("invitations.created_at", &row.created_at)?,
        updated_at: timestamp::from_db("invitations.updated_at", &row.updated_at)?,
        expires_at: timestamp::from_db("invitations.expires_at", &row.expires_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use chrono::Duration;

    fn pending(doctor_id: Uuid, email: &str) -> Invitation {
        Invitation {
            id: Uuid::new_v4(),
            doctor_id,
            patient_email: email.into(),
            patient_id: None,
            status: InvitationStatus::Pending,
            message: Some("Please share your labs".into()),
            created_at: t0(),
            updated_at: t0(),
            expires_at: t0() + Duration::days(30),
        }
    }

    #[test]
    fn unique_pending_per_pair() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        insert_invitation(&conn, &pending(doc.id, "ana@example.com")).unwrap();

        let dup = insert_invitation(&conn, &pending(doc.id, "ana@example.com")).unwrap_err();
        assert!(dup.is_unique_violation());

        // A different email is fine
        insert_invitation(&conn, &pending(doc.id, "bob@example.com")).unwrap();
    }

    #[test]
    fn resolved_invitations_do_not_block_new_pending() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        let ana = seed_patient(&conn, "ana@example.com");
        let first = pending(doc.id, "ana@example.com");
        insert_invitation(&conn, &first).unwrap();
        resolve_pending_invitation(&conn, &first.id, &ana.id, InvitationStatus::Rejected, &t0())
            .unwrap();

        insert_invitation(&conn, &pending(doc.id, "ana@example.com")).unwrap();
    }

    #[test]
    fn resolve_is_conditional() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        let ana = seed_patient(&conn, "ana@example.com");
        let bob = seed_patient(&conn, "bob@example.com");
        let inv = pending(doc.id, "ana@example.com");
        insert_invitation(&conn, &inv).unwrap();

        let n = resolve_pending_invitation(&conn, &inv.id, &ana.id, InvitationStatus::Accepted, &t0())
            .unwrap();
        assert_eq!(n, 1);
        // Second resolution finds nothing pending
        let n = resolve_pending_invitation(&conn, &inv.id, &bob.id, InvitationStatus::Rejected, &t0())
            .unwrap();
        assert_eq!(n, 0);

        let stored = get_invitation(&conn, &inv.id).unwrap().unwrap();
        assert_eq!(stored.status, InvitationStatus::Accepted);
        assert_eq!(stored.patient_id, Some(ana.id));
        assert!(has_accepted_relationship(&conn, &doc.id, &ana.id).unwrap());
        assert!(!has_accepted_relationship(&conn, &doc.id, &bob.id).unwrap());
    }

    #[test]
    fn resolve_refuses_after_expiry() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        let ana = seed_patient(&conn, "ana@example.com");
        let inv = pending(doc.id, "ana@example.com");
        insert_invitation(&conn, &inv).unwrap();

        let late = inv.expires_at + Duration::seconds(1);
        let n = resolve_pending_invitation(&conn, &inv.id, &ana.id, InvitationStatus::Accepted, &late)
            .unwrap();
        assert_eq!(n, 0);

        // Exactly at the expiry instant it is still pending
        let n = resolve_pending_invitation(
            &conn,
            &inv.id,
            &ana.id,
            InvitationStatus::Accepted,
            &inv.expires_at,
        )
        .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn sweep_expires_only_lapsed_pending() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        let old = pending(doc.id, "ana@example.com");
        let mut fresh = pending(doc.id, "bob@example.com");
        fresh.expires_at = t0() + Duration::days(60);
        insert_invitation(&conn, &old).unwrap();
        insert_invitation(&conn, &fresh).unwrap();

        let n = expire_lapsed_invitations(&conn, &(t0() + Duration::days(31))).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            get_invitation(&conn, &old.id).unwrap().unwrap().status,
            InvitationStatus::Expired
        );
        assert_eq!(
            get_invitation(&conn, &fresh.id).unwrap().unwrap().status,
            InvitationStatus::Pending
        );
    }

    #[test]
    fn relationships_are_derived_from_accepted_invitations() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        let ana = seed_patient(&conn, "ana@example.com");
        let inv = pending(doc.id, "ana@example.com");
        insert_invitation(&conn, &inv).unwrap();
        assert!(list_relationships_for_doctor(&conn, &doc.id).unwrap().is_empty());

        resolve_pending_invitation(&conn, &inv.id, &ana.id, InvitationStatus::Accepted, &t0())
            .unwrap();

        let for_doctor = list_relationships_for_doctor(&conn, &doc.id).unwrap();
        assert_eq!(for_doctor.len(), 1);
        assert_eq!(for_doctor[0].patient_id, ana.id);
        assert_eq!(for_doctor[0].invitation_id, inv.id);

        let for_patient = list_relationships_for_patient(&conn, &ana.id).unwrap();
        assert_eq!(for_patient.len(), 1);
        assert_eq!(for_patient[0].doctor_id, doc.id);
    }

    #[test]
    fn patient_listing_matches_email_or_bound_id() {
        let conn = test_db();
        let doc = seed_doctor(&conn, "dr@clinic.io");
        let other = seed_doctor(&conn, "other@clinic.io");
        let ana = seed_patient(&conn, "ana@example.com");
        insert_invitation(&conn, &pending(doc.id, "ana@example.com")).unwrap();
        insert_invitation(&conn, &pending(other.id, "bob@example.com")).unwrap();

        let by_email = list_invitations_for_patient(&conn, "ana@example.com", None).unwrap();
        assert_eq!(by_email.len(), 1);
        let by_both = list_invitations_for_patient(&conn, "ana@example.com", Some(&ana.id)).unwrap();
        assert_eq!(by_both.len(), 1);
    }
}
