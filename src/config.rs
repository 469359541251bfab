use std::net::SocketAddr;
use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "HealthPal";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default bind address for the HTTP service.
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Default requests per minute per bearer token.
pub const DEFAULT_RATE_PER_MINUTE: u32 = 120;

/// Default grace before an untaken dose is marked missed.
pub const DEFAULT_MISSED_DOSE_GRACE_MINUTES: i64 = 120;

/// Audit entries older than this are pruned on flush.
pub const AUDIT_RETENTION_DAYS: i64 = 90;

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> String {
    "healthpal_lib=info,healthpal=info,tower_http=info".to_string()
}

/// Get the application data directory
/// ~/HealthPal/ when a home directory exists, `./HealthPal` otherwise.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default consent store location.
pub fn default_db_path() -> PathBuf {
    app_data_dir().join("healthpal.db")
}

/// Error reading service configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Runtime settings of the HTTP service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind: SocketAddr,
    pub db_path: PathBuf,
    /// JSON file of bearer-token sessions to seed the registry with.
    pub sessions_file: Option<PathBuf>,
    pub rate_per_minute: u32,
    pub missed_dose_grace_minutes: i64,
}

impl ServiceConfig {
    /// Read `HEALTHPAL_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw = lookup("HEALTHPAL_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind: SocketAddr = bind_raw.parse().map_err(|_| ConfigError::InvalidValue {
            var: "HEALTHPAL_BIND",
            value: bind_raw.clone(),
        })?;

        let db_path = lookup("HEALTHPAL_DB")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let sessions_file = lookup("HEALTHPAL_SESSIONS").map(PathBuf::from);

        let rate_per_minute = parse_var(&lookup, "HEALTHPAL_RATE_PER_MINUTE", DEFAULT_RATE_PER_MINUTE)?;
        let missed_dose_grace_minutes = parse_var(
            &lookup,
            "HEALTHPAL_MISSED_DOSE_GRACE_MINUTES",
            DEFAULT_MISSED_DOSE_GRACE_MINUTES,
        )?;
        if rate_per_minute == 0 {
            return Err(ConfigError::InvalidValue {
                var: "HEALTHPAL_RATE_PER_MINUTE",
                value: "0".into(),
            });
        }
        if missed_dose_grace_minutes < 0 {
            return Err(ConfigError::InvalidValue {
                var: "HEALTHPAL_MISSED_DOSE_GRACE_MINUTES",
                value: missed_dose_grace_minutes.to_string(),
            });
        }

        Ok(Self {
            bind,
            db_path,
            sessions_file,
            rate_per_minute,
            missed_dose_grace_minutes,
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
    }
}
