//! Model training module
//!
//! Provides the regressors and the registry-driven training run:
//! - Linear regression (normal equations)
//! - Decision trees, Random Forests and gradient boosting
//! - K-Nearest Neighbors
//! - Neural networks (MLP)

mod config;
mod engine;
mod models;
mod registry;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod knn;
pub mod linear_models;
pub mod neural_network;
pub mod random_forest;

pub use config::{TrainingConfig, DEFAULT_MAX_TARGET};
pub use decision_tree::{DecisionTree, MaxFeatures, TreeNode};
pub use engine::{
    format_elapsed, MetricsReport, ModelFailure, ModelScore, TrainEngine, TrainingRun,
};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use knn::{DistanceMetric, KNNConfig, KNNRegressor, WeightScheme};
pub use linear_models::LinearRegression;
pub use models::{ModelMetrics, Regressor};
pub use neural_network::{Activation, MLPConfig, MLPRegressor};
pub use random_forest::RandomForest;
pub use registry::{InputMode, ModelArtifact, ModelParams, ModelRegistry, ModelSpec, TrainedModel};
