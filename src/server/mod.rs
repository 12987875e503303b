//! Prediction HTTP server
//!
//! Thin axum front over [`crate::inference::PredictionService`]: one
//! prediction per model for a posted observation, the persisted metrics
//! report, and an endpoint to pick up a newly published run.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub artifacts_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            artifacts_dir: std::env::var("ARTIFACTS_DIR")
                .unwrap_or_else(|_| "./models".to_string())
                .into(),
        }
    }
}

async fn shutdown_signal(started_at: chrono::DateTime<chrono::Utc>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for ctrl+c, shutdown only by termination");
        std::future::pending::<()>().await;
    }
    let stop_time = chrono::Utc::now();
    info!(
        stopped_at = %stop_time.to_rfc3339(),
        uptime_secs = stop_time.signed_duration_since(started_at).num_seconds(),
        "Shutdown signal received, stopping server gracefully"
    );
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    info!(artifacts_dir = %config.artifacts_dir.display(), "Loading artifacts");
    let state = Arc::new(AppState::open(config.clone())?);
    let started_at = state.started_at;
    {
        let set = state.service.snapshot();
        info!(
            run_id = %set.run_id(),
            schema = %set.schema(),
            models = ?set.model_names(),
            "Serving run"
        );
    }

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening (press ctrl+c to stop)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(started_at))
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
