//! Immutable set of artifacts loaded from one published run

use crate::artifacts::{ArtifactKey, ArtifactStore, RunManifest, RunSnapshot};
use crate::error::{Result, TripcastError};
use crate::features::{extract, FeatureSchema, RawObservation};
use crate::preprocessing::NormalizerState;
use crate::training::{MetricsReport, ModelArtifact};
use std::collections::BTreeMap;
use tracing::info;

/// Model name to predicted trip duration
pub type Predictions = BTreeMap<String, f64>;

/// Manifest, normalizer, metrics and every model of one run
#[derive(Debug, Clone)]
pub struct ArtifactSet {
    manifest: RunManifest,
    normalizer: NormalizerState,
    metrics: MetricsReport,
    models: Vec<ModelArtifact>,
}

impl ArtifactSet {
    /// Assemble a set, checking every part against the manifest's contract
    pub fn new(
        manifest: RunManifest,
        normalizer: NormalizerState,
        metrics: MetricsReport,
        models: Vec<ModelArtifact>,
    ) -> Result<Self> {
        manifest.validate()?;

        if normalizer.feature_names != manifest.feature_names {
            return Err(TripcastError::SchemaMismatch {
                expected: manifest.feature_names.join(","),
                actual: format!("normalizer fitted on {}", normalizer.feature_names.join(",")),
            });
        }

        for model in &models {
            if model.schema != manifest.schema {
                return Err(TripcastError::SchemaMismatch {
                    expected: manifest.schema.to_string(),
                    actual: format!("model '{}' trained on {}", model.name, model.schema),
                });
            }
            let declared = manifest.entry(&model.name).ok_or_else(|| {
                TripcastError::SchemaMismatch {
                    expected: format!("models {:?}", manifest.model_names().collect::<Vec<_>>()),
                    actual: format!("undeclared model '{}'", model.name),
                }
            })?;
            if declared.input_mode != model.input_mode {
                return Err(TripcastError::SchemaMismatch {
                    expected: format!("'{}' in {} mode", model.name, declared.input_mode),
                    actual: model.input_mode.to_string(),
                });
            }
        }

        Ok(Self {
            manifest,
            normalizer,
            metrics,
            models,
        })
    }

    /// Read every key the snapshot's manifest declares
    pub fn from_snapshot(snapshot: &RunSnapshot) -> Result<Self> {
        let manifest = snapshot.manifest()?;
        let normalizer = snapshot.load(&ArtifactKey::Normalizer)?;
        let metrics = snapshot.load(&ArtifactKey::Metrics)?;
        let models = manifest
            .model_names()
            .map(|name| snapshot.load::<ModelArtifact>(&ArtifactKey::model(name)))
            .collect::<Result<Vec<_>>>()?;

        let set = Self::new(manifest, normalizer, metrics, models)?;
        info!(
            run_id = %set.run_id(),
            schema = %set.schema(),
            models = set.models.len(),
            "Loaded artifact set"
        );
        Ok(set)
    }

    /// Load the live run of a store
    pub fn load(store: &ArtifactStore) -> Result<Self> {
        Self::from_snapshot(&store.load_snapshot()?)
    }

    pub fn run_id(&self) -> &str {
        &self.manifest.run_id
    }

    pub fn schema(&self) -> FeatureSchema {
        self.manifest.schema
    }

    pub fn manifest(&self) -> &RunManifest {
        &self.manifest
    }

    pub fn metrics(&self) -> &MetricsReport {
        &self.metrics
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.iter().map(|m| m.name.as_str()).collect()
    }

    /// Extract, normalize once, then query every model in its own input mode.
    /// Malformed input fails before any model runs.
    pub fn predict(&self, observation: &RawObservation) -> Result<Predictions> {
        let raw = extract(self.schema(), observation)?;
        let standardized = self.normalizer.apply(&raw)?;

        self.models
            .iter()
            .map(|model| Ok((model.name.clone(), model.predict_one(&raw, &standardized)?)))
            .collect()
    }
}
