//! Application state management

use crate::artifacts::ArtifactStore;
use crate::error::Result;
use crate::inference::PredictionService;
use chrono::{DateTime, Utc};

use super::ServerConfig;

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub service: PredictionService,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: ServerConfig, service: PredictionService) -> Self {
        Self {
            config,
            service,
            started_at: Utc::now(),
        }
    }

    /// Load the live run from the configured artifacts directory
    pub fn open(config: ServerConfig) -> Result<Self> {
        let store = ArtifactStore::open(&config.artifacts_dir)?;
        let service = PredictionService::open(store)?;
        Ok(Self::new(config, service))
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }
}
