use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::InvitationStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_email: String,
    pub patient_id: Option<Uuid>,
    pub status: InvitationStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Invitation {
    /// Still pending but past its expiry instant.
    pub fn is_lapsed(&self, now: &DateTime<Utc>) -> bool {
        self.status == InvitationStatus::Pending && *now > self.expires_at
    }

    /// Status as observed at `now`: a lapsed pending invitation reads as expired.
    pub fn effective_status(&self, now: &DateTime<Utc>) -> InvitationStatus {
        if self.is_lapsed(now) {
            InvitationStatus::Expired
        } else {
            self.status
        }
    }

    /// Copy with the lazily evaluated status applied.
    pub fn observed_at(mut self, now: &DateTime<Utc>) -> Self {
        self.status = self.effective_status(now);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pending(expires_at: DateTime<Utc>) -> Invitation {
        let created = expires_at - Duration::days(30);
        Invitation {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_email: "ana@example.com".into(),
            patient_id: None,
            status: InvitationStatus::Pending,
            message: None,
            created_at: created,
            updated_at: created,
            expires_at,
        }
    }

    #[test]
    fn pending_reads_expired_only_after_expiry_instant() {
        let expiry = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let inv = pending(expiry);

        assert_eq!(inv.effective_status(&(expiry - Duration::seconds(1))), InvitationStatus::Pending);
        assert_eq!(inv.effective_status(&expiry), InvitationStatus::Pending);
        assert_eq!(
            inv.effective_status(&(expiry + Duration::microseconds(1))),
            InvitationStatus::Expired
        );
    }

    #[test]
    fn resolved_invitations_never_read_expired() {
        let expiry = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let mut inv = pending(expiry);
        inv.status = InvitationStatus::Accepted;
        assert_eq!(
            inv.observed_at(&(expiry + Duration::days(400))).status,
            InvitationStatus::Accepted
        );
    }
}
