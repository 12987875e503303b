//! Model registry: the one table that drives both training and serving
//!
//! Each entry names a regressor, its hyperparameters and whether it is fitted
//! and queried on raw or standardized features.

use super::decision_tree::{DecisionTree, MaxFeatures};
use super::gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
use super::knn::{KNNConfig, KNNRegressor};
use super::linear_models::LinearRegression;
use super::models::Regressor;
use super::neural_network::{MLPConfig, MLPRegressor};
use super::random_forest::RandomForest;
use crate::error::{Result, TripcastError};
use crate::features::{FeatureRecord, FeatureSchema};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feature space a model is fitted and queried in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Unscaled feature values
    Raw,
    /// Values after the run's fitted normalizer
    Standardized,
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputMode::Raw => write!(f, "raw"),
            InputMode::Standardized => write!(f, "standardized"),
        }
    }
}

/// Hyperparameters per model family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ModelParams {
    LinearRegression {
        fit_intercept: bool,
        alpha: f64,
    },
    DecisionTree {
        max_depth: Option<usize>,
        min_samples_split: usize,
        min_samples_leaf: usize,
        random_state: u64,
    },
    Knn(KNNConfig),
    RandomForest {
        n_estimators: usize,
        max_depth: Option<usize>,
        min_samples_leaf: usize,
        max_features: MaxFeatures,
        random_state: u64,
    },
    GradientBoosting(GradientBoostingConfig),
    NeuralNetwork(MLPConfig),
}

impl ModelParams {
    pub fn family(&self) -> &'static str {
        match self {
            ModelParams::LinearRegression { .. } => "linear_regression",
            ModelParams::DecisionTree { .. } => "decision_tree",
            ModelParams::Knn(_) => "knn",
            ModelParams::RandomForest { .. } => "random_forest",
            ModelParams::GradientBoosting(_) => "gradient_boosting",
            ModelParams::NeuralNetwork(_) => "neural_network",
        }
    }

    /// Linear models read raw features; everything else is standardized
    pub fn default_input_mode(&self) -> InputMode {
        match self {
            ModelParams::LinearRegression { .. } => InputMode::Raw,
            _ => InputMode::Standardized,
        }
    }

    /// An unfitted model configured with these parameters
    pub fn build(&self) -> TrainedModel {
        match self {
            ModelParams::LinearRegression {
                fit_intercept,
                alpha,
            } => TrainedModel::LinearRegression(
                LinearRegression::new()
                    .with_fit_intercept(*fit_intercept)
                    .with_alpha(*alpha),
            ),
            ModelParams::DecisionTree {
                max_depth,
                min_samples_split,
                min_samples_leaf,
                random_state,
            } => {
                let mut tree = DecisionTree::new()
                    .with_min_samples_split(*min_samples_split)
                    .with_min_samples_leaf(*min_samples_leaf)
                    .with_random_state(*random_state);
                tree.max_depth = *max_depth;
                TrainedModel::DecisionTree(tree)
            }
            ModelParams::Knn(config) => TrainedModel::Knn(KNNRegressor::new(config.clone())),
            ModelParams::RandomForest {
                n_estimators,
                max_depth,
                min_samples_leaf,
                max_features,
                random_state,
            } => {
                let mut forest = RandomForest::new(*n_estimators)
                    .with_min_samples_leaf(*min_samples_leaf)
                    .with_max_features(*max_features)
                    .with_random_state(*random_state);
                forest.max_depth = *max_depth;
                TrainedModel::RandomForest(forest)
            }
            ModelParams::GradientBoosting(config) => {
                TrainedModel::GradientBoosting(GradientBoostingRegressor::new(config.clone()))
            }
            ModelParams::NeuralNetwork(config) => {
                TrainedModel::NeuralNetwork(MLPRegressor::new(config.clone()))
            }
        }
    }
}

/// Enum to hold trained model variants; this is what gets persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "family", content = "model", rename_all = "snake_case")]
pub enum TrainedModel {
    LinearRegression(LinearRegression),
    DecisionTree(DecisionTree),
    Knn(KNNRegressor),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingRegressor),
    NeuralNetwork(MLPRegressor),
}

impl TrainedModel {
    fn as_regressor(&self) -> &dyn Regressor {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::Knn(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::NeuralNetwork(m) => m,
        }
    }

    fn as_regressor_mut(&mut self) -> &mut dyn Regressor {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::DecisionTree(m) => m,
            TrainedModel::Knn(m) => m,
            TrainedModel::RandomForest(m) => m,
            TrainedModel::GradientBoosting(m) => m,
            TrainedModel::NeuralNetwork(m) => m,
        }
    }
}

impl Regressor for TrainedModel {
    fn name(&self) -> &'static str {
        self.as_regressor().name()
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_regressor_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_regressor().predict(x)
    }

    fn is_fitted(&self) -> bool {
        self.as_regressor().is_fitted()
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub input_mode: InputMode,
    pub params: ModelParams,
}

impl ModelSpec {
    /// Entry using the family's conventional input mode
    pub fn new(name: impl Into<String>, params: ModelParams) -> Self {
        let input_mode = params.default_input_mode();
        Self {
            name: name.into(),
            input_mode,
            params,
        }
    }

    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }
}

/// Ordered, uniquely named collection of model entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRegistry {
    entries: Vec<ModelSpec>,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::empty()
            .with_entry(ModelSpec::new(
                "decision_tree",
                ModelParams::DecisionTree {
                    max_depth: None,
                    min_samples_split: 2,
                    min_samples_leaf: 1,
                    random_state: 0,
                },
            ))
            .with_entry(ModelSpec::new(
                "gradient_boosting",
                ModelParams::GradientBoosting(GradientBoostingConfig::default()),
            ))
            .with_entry(ModelSpec::new("knn", ModelParams::Knn(KNNConfig::default())))
            .with_entry(ModelSpec::new(
                "linear_regression",
                ModelParams::LinearRegression {
                    fit_intercept: true,
                    alpha: 0.0,
                },
            ))
            .with_entry(ModelSpec::new(
                "neural_network",
                ModelParams::NeuralNetwork(MLPConfig::default()),
            ))
            .with_entry(ModelSpec::new(
                "random_forest",
                ModelParams::RandomForest {
                    n_estimators: 100,
                    max_depth: None,
                    min_samples_leaf: 1,
                    max_features: MaxFeatures::All,
                    random_state: 42,
                },
            ))
    }
}

impl ModelRegistry {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Add an entry, replacing any entry with the same name in place
    pub fn with_entry(mut self, spec: ModelSpec) -> Self {
        match self.entries.iter_mut().find(|e| e.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.entries.push(spec),
        }
        self
    }

    pub fn without(mut self, name: &str) -> Self {
        self.entries.retain(|e| e.name != name);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ModelSpec> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelSpec> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names double as artifact file stems, so they are restricted to `[A-Za-z0-9_-]`.
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(TripcastError::Config("model registry is empty".to_string()));
        }
        for spec in &self.entries {
            let valid = !spec.name.is_empty()
                && spec
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(TripcastError::Config(format!(
                    "invalid model name '{}'",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

/// A fitted regressor bound to the feature contract and input mode it expects
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub schema: FeatureSchema,
    pub input_mode: InputMode,
    pub model: TrainedModel,
}

impl ModelArtifact {
    /// Predict one observation, choosing the record that matches the input mode.
    pub fn predict_one(&self, raw: &FeatureRecord, standardized: &FeatureRecord) -> Result<f64> {
        let record = match self.input_mode {
            InputMode::Raw => raw,
            InputMode::Standardized => standardized,
        };
        if record.schema() != self.schema {
            return Err(TripcastError::SchemaMismatch {
                expected: format!("model '{}' trained on {}", self.name, self.schema),
                actual: record.schema().to_string(),
            });
        }

        let value = self
            .model
            .predict(&record.to_array())?
            .first()
            .copied()
            .ok_or_else(|| TripcastError::Inference(format!("model '{}' returned no prediction", self.name)))?;
        if !value.is_finite() {
            return Err(TripcastError::Inference(format!(
                "model '{}' produced a non-finite prediction",
                self.name
            )));
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = ModelRegistry::default();
        assert_eq!(
            registry.names(),
            vec![
                "decision_tree",
                "gradient_boosting",
                "knn",
                "linear_regression",
                "neural_network",
                "random_forest"
            ]
        );
        assert!(registry.validate().is_ok());

        for spec in registry.iter() {
            let expected = if spec.name == "linear_regression" {
                InputMode::Raw
            } else {
                InputMode::Standardized
            };
            assert_eq!(spec.input_mode, expected, "{}", spec.name);
        }
    }

    #[test]
    fn test_with_entry_replaces() {
        let registry = ModelRegistry::default().with_entry(ModelSpec::new(
            "knn",
            ModelParams::Knn(KNNConfig {
                n_neighbors: 3,
                ..Default::default()
            }),
        ));
        assert_eq!(registry.len(), 6);
        assert!(matches!(
            registry.get("knn").map(|s| &s.params),
            Some(ModelParams::Knn(KNNConfig { n_neighbors: 3, .. }))
        ));

        let registry = registry.without("knn");
        assert_eq!(registry.len(), 5);
        assert!(registry.get("knn").is_none());
    }

    #[test]
    fn test_invalid_names() {
        let registry = ModelRegistry::empty().with_entry(ModelSpec::new(
            "../escape",
            ModelParams::Knn(KNNConfig::default()),
        ));
        assert!(registry.validate().is_err());
        assert!(ModelRegistry::empty().validate().is_err());
    }

    #[test]
    fn test_params_round_trip_through_json() {
        let registry = ModelRegistry::default();
        let json = serde_json::to_string(&registry).unwrap();
        let back: ModelRegistry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, registry);
    }

    #[test]
    fn test_build_matches_family() {
        for spec in ModelRegistry::default().iter() {
            let model = spec.params.build();
            assert_eq!(model.name(), spec.params.family());
            assert!(!model.is_fitted());
        }
    }
}
