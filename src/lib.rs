pub mod api;
pub mod authorization;
pub mod config;
pub mod core_state;
pub mod db;
pub mod error;
pub mod identity;
pub mod invitations;
pub mod models;
pub mod records;
pub mod scheduler;
pub mod sharing;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::api::types::SessionLoadError;
use crate::api::{ServerError, SessionRegistry};
use crate::config::{ConfigError, ServiceConfig};
use crate::core_state::{AccessSource, CoreError, CoreState};

/// Fatal errors while bringing the service up.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Cannot create data directory: {0}")]
    DataDir(#[from] std::io::Error),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Sessions(#[from] SessionLoadError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Initialize tracing from `RUST_LOG`, falling back to the default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}

/// Start the service and block until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = ServiceConfig::from_env()?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let core = Arc::new(CoreState::new(&config));

    // Opening the store here also applies migrations before any request.
    let report = core.run_sweeps(chrono::Utc::now())?;
    tracing::info!(
        expired_invitations = report.expired_invitations,
        missed_doses = report.missed_doses,
        "Startup sweep complete"
    );
    core.log_access(AccessSource::System, "sweep", "startup");

    let sessions = Arc::new(SessionRegistry::new());
    match &config.sessions_file {
        Some(path) => {
            sessions.load_from_file(path)?;
        }
        None => tracing::warn!("HEALTHPAL_SESSIONS not set; every protected route will return 401"),
    }

    let app = api::api_router(core.clone(), sessions, config.rate_per_minute);
    let server = api::start_server(config.bind, app).await?;
    tracing::info!(addr = %server.addr, db = %core.db_path().display(), "Listening");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    server.shutdown().await;

    if let Err(e) = core.flush_and_prune_audit() {
        tracing::warn!("Final audit flush failed: {e}");
    }
    Ok(())
}
