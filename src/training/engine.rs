//! Training engine: fit and evaluate every registry entry against one split

use super::config::TrainingConfig;
use super::models::{ModelMetrics, Regressor};
use super::registry::{InputMode, ModelArtifact, ModelRegistry, ModelSpec};
use crate::dataset::{PreparationReport, PreparedDataset};
use crate::error::{Result, TripcastError};
use crate::features::FeatureSchema;
use crate::preprocessing::NormalizerState;
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Held-out scores for one model, in the persisted report's field names
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub mean_squared_error: f64,
    pub r2_score: f64,
}

impl From<&ModelMetrics> for ModelScore {
    fn from(m: &ModelMetrics) -> Self {
        Self {
            mean_squared_error: m.mse,
            r2_score: m.r2,
        }
    }
}

/// `{model_name: {mean_squared_error, r2_score}}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsReport(BTreeMap<String, ModelScore>);

impl MetricsReport {
    pub fn insert(&mut self, model: impl Into<String>, score: ModelScore) {
        self.0.insert(model.into(), score);
    }

    pub fn get(&self, model: &str) -> Option<&ModelScore> {
        self.0.get(model)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ModelScore)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A registry entry that did not produce an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub reason: String,
}

/// Everything one training run produced
#[derive(Debug, Clone)]
pub struct TrainingRun {
    pub schema: FeatureSchema,
    pub feature_names: Vec<String>,
    pub normalizer: NormalizerState,
    /// Successful models in registry order
    pub artifacts: Vec<ModelArtifact>,
    pub metrics: MetricsReport,
    /// Full held-out metrics per model
    pub details: BTreeMap<String, ModelMetrics>,
    /// Fit plus evaluation time per model
    pub timings: BTreeMap<String, Duration>,
    pub failures: Vec<ModelFailure>,
    pub report: PreparationReport,
    pub elapsed: Duration,
}

impl TrainingRun {
    pub fn artifact(&self, name: &str) -> Option<&ModelArtifact> {
        self.artifacts.iter().find(|a| a.name == name)
    }

    /// Human-readable report of the run
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let r = &self.report;
        let _ = writeln!(
            out,
            "Feature schema: {} ({} features)",
            self.schema,
            self.feature_names.len()
        );
        let _ = writeln!(
            out,
            "Rows: {} loaded, {} out of range, {} invalid, {} train / {} test",
            r.rows_loaded, r.rows_out_of_range, r.rows_invalid, r.train_rows, r.test_rows
        );
        for artifact in &self.artifacts {
            if let Some(score) = self.metrics.get(&artifact.name) {
                let secs = self
                    .timings
                    .get(&artifact.name)
                    .map(Duration::as_secs_f64)
                    .unwrap_or_default();
                let _ = writeln!(
                    out,
                    "  {:<20} mse={:<14.3} r2={:<8.4} ({:.2}s, {})",
                    artifact.name, score.mean_squared_error, score.r2_score, secs, artifact.input_mode
                );
            }
        }
        for failure in &self.failures {
            let _ = writeln!(out, "  {:<20} FAILED: {}", failure.model, failure.reason);
        }
        let _ = write!(out, "Completed in {}", format_elapsed(self.elapsed));
        out
    }
}

/// Whole minutes and whole seconds, e.g. `2 minutes and 5 seconds`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!("{} minutes and {} seconds", total / 60, total % 60)
}

/// Runs the registry over a prepared dataset
#[derive(Debug, Clone)]
pub struct TrainEngine {
    config: TrainingConfig,
    abort: Arc<AtomicBool>,
}

struct ModelOutcome {
    artifact: ModelArtifact,
    metrics: ModelMetrics,
    elapsed: Duration,
}

/// Train and test matrices for both input modes
struct ModeInputs<'a> {
    raw_train: &'a Array2<f64>,
    raw_test: &'a Array2<f64>,
    std_train: Array2<f64>,
    std_test: Array2<f64>,
}

impl ModeInputs<'_> {
    fn for_mode(&self, mode: InputMode) -> (&Array2<f64>, &Array2<f64>) {
        match mode {
            InputMode::Raw => (self.raw_train, self.raw_test),
            InputMode::Standardized => (&self.std_train, &self.std_test),
        }
    }
}

impl TrainEngine {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            abort: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Share an externally owned abort flag (e.g. set from a ctrl-c handler)
    pub fn with_abort_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.abort = flag;
        self
    }

    /// Flag that aborts the run before the next model starts
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    fn aborted(&self) -> bool {
        self.abort.load(Ordering::SeqCst)
    }

    /// Fit the normalizer on the training partition, then fit and score every
    /// registry entry. One entry failing does not stop the others; the run
    /// fails only when no entry succeeds or the run is aborted.
    pub fn run(&self, data: &PreparedDataset, registry: &ModelRegistry) -> Result<TrainingRun> {
        let start = Instant::now();
        registry.validate()?;
        data.schema.check_names(&data.feature_names)?;

        let normalizer = NormalizerState::fit(self.config.scaler, &data.feature_names, &data.x_train)?;
        let inputs = ModeInputs {
            raw_train: &data.x_train,
            raw_test: &data.x_test,
            std_train: normalizer.transform(&data.feature_names, &data.x_train)?,
            std_test: normalizer.transform(&data.feature_names, &data.x_test)?,
        };

        info!(
            models = registry.len(),
            parallel = self.config.parallel,
            train_rows = data.x_train.nrows(),
            test_rows = data.x_test.nrows(),
            "Starting training run"
        );

        let specs: Vec<&ModelSpec> = registry.iter().collect();
        let fit_one = |spec: &&ModelSpec| self.train_one(spec, data, &inputs);

        let outcomes: Vec<Result<ModelOutcome>> = if self.config.parallel {
            match self.config.n_jobs {
                Some(n_jobs) => {
                    let pool = rayon::ThreadPoolBuilder::new()
                        .num_threads(n_jobs)
                        .build()
                        .map_err(|e| TripcastError::Config(format!("cannot build worker pool: {}", e)))?;
                    pool.install(|| specs.par_iter().map(fit_one).collect())
                }
                None => specs.par_iter().map(fit_one).collect(),
            }
        } else {
            specs.iter().map(fit_one).collect()
        };

        if self.aborted() {
            warn!("Training run aborted");
            return Err(TripcastError::Aborted);
        }

        let mut artifacts = Vec::new();
        let mut metrics = MetricsReport::default();
        let mut details = BTreeMap::new();
        let mut timings = BTreeMap::new();
        let mut failures = Vec::new();

        for (spec, outcome) in specs.iter().zip(outcomes) {
            match outcome {
                Ok(outcome) => {
                    metrics.insert(spec.name.clone(), ModelScore::from(&outcome.metrics));
                    details.insert(spec.name.clone(), outcome.metrics);
                    timings.insert(spec.name.clone(), outcome.elapsed);
                    artifacts.push(outcome.artifact);
                }
                Err(e) => {
                    let reason = match e {
                        TripcastError::Training { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    warn!(model = %spec.name, reason = %reason, "Model failed");
                    failures.push(ModelFailure {
                        model: spec.name.clone(),
                        reason,
                    });
                }
            }
        }

        if artifacts.is_empty() {
            let reasons: Vec<String> = failures
                .iter()
                .map(|f| format!("{}: {}", f.model, f.reason))
                .collect();
            return Err(TripcastError::training(
                "*",
                format!("every model failed ({})", reasons.join("; ")),
            ));
        }

        let elapsed = start.elapsed();
        info!(
            succeeded = artifacts.len(),
            failed = failures.len(),
            elapsed_secs = elapsed.as_secs_f64(),
            "Training run complete"
        );

        Ok(TrainingRun {
            schema: data.schema,
            feature_names: data.feature_names.clone(),
            normalizer,
            artifacts,
            metrics,
            details,
            timings,
            failures,
            report: data.report.clone(),
            elapsed,
        })
    }

    fn train_one(
        &self,
        spec: &ModelSpec,
        data: &PreparedDataset,
        inputs: &ModeInputs<'_>,
    ) -> Result<ModelOutcome> {
        if self.aborted() {
            return Err(TripcastError::Aborted);
        }

        let start = Instant::now();
        info!(model = %spec.name, mode = %spec.input_mode, "Training model");

        let (x_train, x_test) = inputs.for_mode(spec.input_mode);
        let mut model = spec.params.build();
        model
            .fit(x_train, &data.y_train)
            .map_err(|e| named_failure(&spec.name, e))?;

        let y_pred: Array1<f64> = model
            .predict(x_test)
            .map_err(|e| named_failure(&spec.name, e))?;
        if y_pred.iter().any(|p| !p.is_finite()) {
            return Err(TripcastError::training(&spec.name, "non-finite predictions on the test partition"));
        }
        let metrics = ModelMetrics::compute_regression(&data.y_test, &y_pred)?;

        let elapsed = start.elapsed();
        info!(
            model = %spec.name,
            mse = metrics.mse,
            r2 = metrics.r2,
            elapsed_secs = elapsed.as_secs_f64(),
            "Model trained"
        );

        Ok(ModelOutcome {
            artifact: ModelArtifact {
                name: spec.name.clone(),
                schema: data.schema,
                input_mode: spec.input_mode,
                model,
            },
            metrics,
            elapsed,
        })
    }
}

/// Re-label an error with the registry entry's name
fn named_failure(name: &str, err: TripcastError) -> TripcastError {
    match err {
        TripcastError::Training { reason, .. } => TripcastError::training(name, reason),
        other => TripcastError::training(name, other.to_string()),
    }
}
