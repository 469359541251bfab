use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::timestamp;
use crate::db::DatabaseError;
use crate::models::{AlertRelatedType, CustomAlert};

pub fn insert_alert(conn: &Connection, alert: &CustomAlert) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO custom_alerts (id, patient_id, related_id, related_type, title,
         trigger_date, is_read, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            alert.id.to_string(),
            alert.patient_id.to_string(),
            alert.related_id.to_string(),
            alert.related_type.as_str(),
            alert.title,
            timestamp::to_db(&alert.trigger_date),
            alert.is_read,
            timestamp::to_db(&alert.created_at),
        ],
    )?;
    Ok(())
}

/// A patient's alerts by trigger date. `unread_only` hides read ones.
pub fn list_alerts_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
    unread_only: bool,
) -> Result<Vec<CustomAlert>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, related_id, related_type, title, trigger_date, is_read, created_at
         FROM custom_alerts
         WHERE patient_id = ?1 AND (?2 = 0 OR is_read = 0)
         ORDER BY trigger_date",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string(), unread_only], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, bool>(6)?,
            row.get::<_, String>(7)?,
        ))
    })?;

    let mut alerts = Vec::new();
    for row in rows {
        let (id, patient_id, related_id, related_type, title, trigger_date, is_read, created_at) = row?;
        alerts.push(CustomAlert {
            id: parse_uuid("custom_alerts.id", &id)?,
            patient_id: parse_uuid("custom_alerts.patient_id", &patient_id)?,
            related_id: parse_uuid("custom_alerts.related_id", &related_id)?,
            related_type: AlertRelatedType::from_str(&related_type)?,
            title,
            trigger_date: timestamp::from_db("custom_alerts.trigger_date", &trigger_date)?,
            is_read,
            created_at: timestamp::from_db("custom_alerts.created_at", &created_at)?,
        });
    }
    Ok(alerts)
}

/// Mark one of the patient's alerts read. Returns rows matched (0 when
/// the alert does not exist or belongs to someone else).
pub fn mark_alert_read(conn: &Connection, alert_id: &Uuid, patient_id: &Uuid) -> Result<usize, DatabaseError> {
    let updated = conn.execute(
        "UPDATE custom_alerts SET is_read = 1 WHERE id = ?1 AND patient_id = ?2",
        params![alert_id.to_string(), patient_id.to_string()],
    )?;
    Ok(updated)
}

/// Drop alerts pointing at a deleted entity.
pub fn delete_alerts_for_related(
    conn: &Connection,
    related_type: AlertRelatedType,
    related_id: &Uuid,
) -> Result<usize, DatabaseError> {
    let deleted = conn.execute(
        "DELETE FROM custom_alerts WHERE related_type = ?1 AND related_id = ?2",
        params![related_type.as_str(), related_id.to_string()],
    )?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::fixtures::*;
    use chrono::Duration;

    fn alert(patient_id: Uuid, related_id: Uuid, hours: i64) -> CustomAlert {
        CustomAlert {
            id: Uuid::new_v4(),
            patient_id,
            related_id,
            related_type: AlertRelatedType::Prescription,
            title: "Next dose".into(),
            trigger_date: t0() + Duration::hours(hours),
            is_read: false,
            created_at: t0(),
        }
    }

    #[test]
    fn unread_filter_and_ownership() {
        let conn = test_db();
        let ana = seed_patient(&conn, "ana@example.com");
        let bob = seed_patient(&conn, "bob@example.com");
        let first = alert(ana.id, Uuid::new_v4(), 1);
        let second = alert(ana.id, Uuid::new_v4(), 2);
        insert_alert(&conn, &second).unwrap();
        insert_alert(&conn, &first).unwrap();

        assert_eq!(mark_alert_read(&conn, &first.id, &bob.id).unwrap(), 0);
        assert_eq!(mark_alert_read(&conn, &first.id, &ana.id).unwrap(), 1);

        let all = list_alerts_for_patient(&conn, &ana.id, false).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, first.id);
        assert!(all[0].is_read);

        let unread = list_alerts_for_patient(&conn, &ana.id, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, second.id);
    }

    #[test]
    fn delete_by_related_entity() {
        let conn = test_db();
        let ana = seed_patient(&conn, "ana@example.com");
        let rx = Uuid::new_v4();
        insert_alert(&conn, &alert(ana.id, rx, 1)).unwrap();
        insert_alert(&conn, &alert(ana.id, Uuid::new_v4(), 1)).unwrap();

        let n = delete_alerts_for_related(&conn, AlertRelatedType::Prescription, &rx).unwrap();
        assert_eq!(n, 1);
        assert_eq!(list_alerts_for_patient(&conn, &ana.id, false).unwrap().len(), 1);
    }
}
