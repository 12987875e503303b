//! Run manifest: the feature contract and inventory of a published run

use crate::dataset::PreparationReport;
use crate::error::{Result, TripcastError};
use crate::features::FeatureSchema;
use crate::training::{InputMode, ModelFailure, TrainingRun};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successfully trained model in a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub input_mode: InputMode,
    pub training_seconds: f64,
}

/// Declares which feature contract an artifact set was trained against and
/// which model keys it contains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub crate_version: String,
    pub schema: FeatureSchema,
    pub feature_names: Vec<String>,
    pub models: Vec<ManifestEntry>,
    #[serde(default)]
    pub failures: Vec<ModelFailure>,
    pub dataset: PreparationReport,
    pub elapsed_seconds: f64,
}

impl RunManifest {
    pub fn from_run(run_id: impl Into<String>, created_at: DateTime<Utc>, run: &TrainingRun) -> Self {
        let models = run
            .artifacts
            .iter()
            .map(|a| ManifestEntry {
                name: a.name.clone(),
                input_mode: a.input_mode,
                training_seconds: run
                    .timings
                    .get(&a.name)
                    .map(|d| d.as_secs_f64())
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            run_id: run_id.into(),
            created_at,
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
            schema: run.schema,
            feature_names: run.feature_names.clone(),
            models,
            failures: run.failures.clone(),
            dataset: run.report.clone(),
            elapsed_seconds: run.elapsed.as_secs_f64(),
        }
    }

    pub fn model_names(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.name.as_str())
    }

    pub fn entry(&self, name: &str) -> Option<&ManifestEntry> {
        self.models.iter().find(|m| m.name == name)
    }

    /// The declared feature names must be exactly the schema's.
    pub fn validate(&self) -> Result<()> {
        self.schema.check_names(&self.feature_names)?;
        if self.models.is_empty() {
            return Err(TripcastError::Data(format!(
                "run '{}' contains no models",
                self.run_id
            )));
        }
        Ok(())
    }
}
