//! Prediction service over a swappable artifact set

use super::artifact_set::{ArtifactSet, Predictions};
use crate::artifacts::ArtifactStore;
use crate::error::Result;
use crate::features::RawObservation;
use crate::training::MetricsReport;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Serves predictions from the live run.
///
/// Readers clone the current `Arc` and work on it without holding the lock;
/// `reload` builds the replacement completely before swapping it in.
pub struct PredictionService {
    store: ArtifactStore,
    current: RwLock<Arc<ArtifactSet>>,
    predictions_served: AtomicU64,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("root", &self.store.root())
            .field("run_id", &self.snapshot().run_id())
            .field("predictions_served", &self.predictions_served())
            .finish()
    }
}

impl PredictionService {
    /// Load the live run of `store`
    pub fn open(store: ArtifactStore) -> Result<Self> {
        let set = ArtifactSet::load(&store)?;
        Ok(Self {
            store,
            current: RwLock::new(Arc::new(set)),
            predictions_served: AtomicU64::new(0),
        })
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// The artifact set requests are currently answered from
    pub fn snapshot(&self) -> Arc<ArtifactSet> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the live run and swap it in. On failure the old set stays.
    pub fn reload(&self) -> Result<String> {
        let next = Arc::new(ArtifactSet::load(&self.store)?);
        let run_id = next.run_id().to_string();
        let previous = std::mem::replace(&mut *self.current.write(), next);
        info!(
            from = %previous.run_id(),
            to = %run_id,
            "Reloaded artifact set"
        );
        Ok(run_id)
    }

    pub fn predict(&self, observation: &RawObservation) -> Result<Predictions> {
        let set = self.snapshot();
        let predictions = set.predict(observation)?;
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
        debug!(run_id = %set.run_id(), models = predictions.len(), "Prediction served");
        Ok(predictions)
    }

    /// Predict from a loosely typed request body
    pub fn predict_json(&self, body: &Value) -> Result<Predictions> {
        let observation = RawObservation::from_json(body)?;
        self.predict(&observation)
    }

    /// Metrics report of the live run
    pub fn results(&self) -> MetricsReport {
        self.snapshot().metrics().clone()
    }

    pub fn predictions_served(&self) -> u64 {
        self.predictions_served.load(Ordering::Relaxed)
    }
}
