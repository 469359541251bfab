//! Shared application state for the HTTP service.
//!
//! `CoreState` is wrapped in `Arc` at startup and handed to every request
//! through the API context. It owns no connection: each request opens its
//! own SQLite handle via [`CoreState::open_db`].

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::config::{self, ServiceConfig};
use crate::db::{self, AuditRecord};
use crate::error::ServiceError;
use crate::{invitations, scheduler};

/// Maximum audit buffer size before flush.
const AUDIT_BUFFER_CAPACITY: usize = 100;

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    db_path: PathBuf,
    missed_dose_grace: Duration,
    audit: AuditLogger,
}

impl CoreState {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            missed_dose_grace: Duration::minutes(config.missed_dose_grace_minutes),
            audit: AuditLogger::new(),
        }
    }

    /// State over an explicit database file (tests, tooling).
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            missed_dose_grace: Duration::minutes(config::DEFAULT_MISSED_DOSE_GRACE_MINUTES),
            audit: AuditLogger::new(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Open a fresh connection to the consent store. Migrations run on open.
    pub fn open_db(&self) -> Result<rusqlite::Connection, CoreError> {
        db::open_database(&self.db_path).map_err(CoreError::Database)
    }

    /// Run the expiry and missed-dose sweeps once.
    pub fn run_sweeps(&self, now: DateTime<Utc>) -> Result<SweepReport, CoreError> {
        let conn = self.open_db()?;
        let expired_invitations = invitations::expire_stale_invitations(&conn, now)?;
        let missed_doses = scheduler::mark_missed_doses(&conn, now, self.missed_dose_grace)?;
        Ok(SweepReport {
            expired_invitations,
            missed_doses,
        })
    }

    // ── Audit logging ───────────────────────────────────────

    /// Log an access event. Auto-flushes to DB when buffer is full.
    pub fn log_access(&self, source: AccessSource, action: &str, entity: &str) {
        let needs_flush = self.audit.log(source, action, entity);
        if needs_flush {
            if let Err(e) = self.flush_and_prune_audit() {
                tracing::warn!("Auto-flush audit failed: {e}");
            }
        }
    }

    /// Get the current audit buffer contents.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit.entries()
    }

    /// Flush audit buffer to DB and prune entries past retention.
    pub fn flush_and_prune_audit(&self) -> Result<(), CoreError> {
        let conn = self.open_db()?;
        self.audit.flush_to_db(&conn)?;
        let cutoff = Utc::now() - Duration::days(config::AUDIT_RETENTION_DAYS);
        if let Err(e) = db::prune_audit_log(&conn, &cutoff) {
            tracing::warn!("Failed to prune audit log: {e}");
        }
        Ok(())
    }
}

/// Counts from one sweep run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub expired_invitations: usize,
    pub missed_doses: usize,
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("{0}")]
    Service(#[from] ServiceError),
}

// ═══════════════════════════════════════════════════════════
// Access source tracking
// ═══════════════════════════════════════════════════════════

/// Identifies the source of a data access for audit logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessSource {
    /// Authenticated API caller.
    Api { role: &'static str, subject_id: Uuid },
    /// Request rejected before identification.
    Anonymous,
    /// Startup or maintenance task.
    System,
}

impl std::fmt::Display for AccessSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Api { role, .. } => write!(f, "api:{role}"),
            Self::Anonymous => write!(f, "api:anonymous"),
            Self::System => write!(f, "system"),
        }
    }
}

impl AccessSource {
    pub fn subject_id(&self) -> Option<Uuid> {
        match self {
            Self::Api { subject_id, .. } => Some(*subject_id),
            Self::Anonymous | Self::System => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Audit logger
// ═══════════════════════════════════════════════════════════

pub struct AuditLogger {
    buffer: Mutex<Vec<AuditEntry>>,
}

/// A single audit log entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub source: AccessSource,
    pub action: String,
    pub entity: String,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            buffer: Mutex::new(Vec::with_capacity(AUDIT_BUFFER_CAPACITY)),
        }
    }

    /// Log an access event to the in-memory buffer.
    /// Returns `true` if the buffer has reached flush threshold.
    pub fn log(&self, source: AccessSource, action: &str, entity: &str) -> bool {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.push(AuditEntry {
                timestamp: Utc::now(),
                source,
                action: action.to_string(),
                entity: entity.to_string(),
            });
            buf.len() >= AUDIT_BUFFER_CAPACITY
        } else {
            false
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|buf| buf.clone())
            .unwrap_or_default()
    }

    pub fn drain(&self) -> Vec<AuditEntry> {
        self.buffer
            .lock()
            .map(|mut buf| buf.drain(..).collect())
            .unwrap_or_default()
    }

    pub fn buffer_len(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or(0)
    }

    /// Write buffered entries to the `audit_log` table.
    pub fn flush_to_db(&self, conn: &rusqlite::Connection) -> Result<usize, CoreError> {
        let entries = self.drain();
        if entries.is_empty() {
            return Ok(0);
        }

        let records: Vec<AuditRecord> = entries
            .iter()
            .map(|e| AuditRecord {
                timestamp: db::timestamp::to_db(&e.timestamp),
                source: e.source.to_string(),
                action: e.action.clone(),
                entity: e.entity.clone(),
                subject_id: e.source.subject_id().map(|id| id.to_string()),
            })
            .collect();

        let count = records.len();
        db::insert_audit_entries(conn, &records)?;

        tracing::debug!(count, "Flushed audit entries to database");
        Ok(count)
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
