use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::db::timestamp;
use crate::db::DatabaseError;

/// One row of the access audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub source: String,
    pub action: String,
    pub entity: String,
    pub subject_id: Option<String>,
}

/// Insert a batch of audit entries in one transaction-friendly loop.
pub fn insert_audit_entries(conn: &Connection, entries: &[AuditRecord]) -> Result<(), DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO audit_log (timestamp, source, action, entity, subject_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for entry in entries {
        stmt.execute(params![
            entry.timestamp,
            entry.source,
            entry.action,
            entry.entity,
            entry.subject_id,
        ])?;
    }
    Ok(())
}

/// Delete entries written before `cutoff`.
pub fn prune_audit_log(conn: &Connection, cutoff: &DateTime<Utc>) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM audit_log WHERE timestamp < ?1",
        params![timestamp::to_db(cutoff)],
    )?;
    Ok(deleted)
}

/// Entries for one subject since `since`, newest first.
pub fn query_audit_by_subject(
    conn: &Connection,
    subject_id: &str,
    since: &DateTime<Utc>,
) -> Result<Vec<AuditRecord>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, source, action, entity, subject_id FROM audit_log
         WHERE subject_id = ?1 AND timestamp >= ?2
         ORDER BY timestamp DESC, id DESC",
    )?;
    let rows = stmt
        .query_map(params![subject_id, timestamp::to_db(since)], |row| {
            Ok(AuditRecord {
                timestamp: row.get(0)?,
                source: row.get(1)?,
                action: row.get(2)?,
                entity: row.get(3)?,
                subject_id: row.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
