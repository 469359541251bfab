//! Shared types for the API layer.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config;
use crate::core_state::CoreState;
use crate::identity::Caller;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
    pub identity: Arc<dyn IdentityProvider>,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self::with_rate_limit(core, identity, config::DEFAULT_RATE_PER_MINUTE)
    }

    pub fn with_rate_limit(
        core: Arc<CoreState>,
        identity: Arc<dyn IdentityProvider>,
        per_minute: u32,
    ) -> Self {
        Self {
            core,
            identity,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(per_minute))),
        }
    }
}

/// Success envelope: `{"success": true, "data": …}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> axum::Json<Self> {
        axum::Json(Self { success: true, data })
    }
}

// ═══════════════════════════════════════════════════════════
// Identity: bearer token to caller
// ═══════════════════════════════════════════════════════════

/// Authentication collaborator: resolves a bearer token to the caller it
/// was issued for. Verification of the underlying credentials happens
/// outside this service.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Hash a bearer token string using SHA-256.
pub fn hash_token(token: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().into()
}

/// Generate a random bearer token (URL-safe base64, 32 bytes of entropy).
pub fn generate_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// One entry of the sessions seed file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSeed {
    pub token: String,
    pub role: SeedRole,
    pub subject_id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedRole {
    Doctor,
    Patient,
}

/// Error loading the sessions seed file.
#[derive(Debug, thiserror::Error)]
pub enum SessionLoadError {
    #[error("Failed to read sessions file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed sessions file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// In-memory token registry. Only SHA-256 hashes of tokens are kept.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<[u8; 32], Caller>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token for a caller.
    pub fn register(&self, token: &str, caller: Caller) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.insert(hash_token(token), caller);
        }
    }

    /// Issue a fresh token for a caller.
    pub fn issue(&self, caller: Caller) -> String {
        let token = generate_token();
        self.register(&token, caller);
        token
    }

    pub fn revoke(&self, token: &str) -> bool {
        self.sessions
            .write()
            .map(|mut sessions| sessions.remove(&hash_token(token)).is_some())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed from a JSON array of `{token, role, subjectId, email}`.
    pub fn load_from_file(&self, path: &Path) -> Result<usize, SessionLoadError> {
        let raw = std::fs::read_to_string(path)?;
        let seeds: Vec<SessionSeed> = serde_json::from_str(&raw)?;
        let count = seeds.len();
        for seed in seeds {
            let caller = match seed.role {
                SeedRole::Doctor => Caller::doctor(seed.subject_id, &seed.email),
                SeedRole::Patient => Caller::patient(seed.subject_id, &seed.email),
            };
            self.register(&seed.token, caller);
        }
        tracing::info!(count, "Loaded API sessions");
        Ok(count)
    }
}

impl IdentityProvider for SessionRegistry {
    fn resolve(&self, token: &str) -> Option<Caller> {
        let hash = hash_token(token);
        self.sessions.read().ok()?.get(&hash).cloned()
    }
}

// ═══════════════════════════════════════════════════════════
// Rate limiter: per-caller sliding window
// ═══════════════════════════════════════════════════════════

/// Per-key rate limiter over a one-minute window.
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    per_minute: u32,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            windows: HashMap::new(),
            per_minute,
        }
    }

    /// Check if a key is within its limit. Returns `Ok(())` or
    /// `Err(retry_after_secs)` if exceeded.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let entries = self.windows.entry(key.to_string()).or_default();

        entries.retain(|ts| now.duration_since(*ts) < Duration::from_secs(60));
        if entries.len() as u32 >= self.per_minute {
            let oldest = entries.first().copied().unwrap_or(now);
            let waited = now.duration_since(oldest).as_secs();
            return Err(60u64.saturating_sub(waited).max(1));
        }

        entries.push(now);
        Ok(())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(config::DEFAULT_RATE_PER_MINUTE)
    }
}
