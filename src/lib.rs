//! tripcast - trip duration regression
//!
//! Trains a registry of regressors on historical taxi trips, publishes the
//! fitted models with their feature contract, and serves one prediction per
//! model for a single trip.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`features`] - Raw observation to fixed-schema feature records
//! - [`dataset`] - CSV loading, outlier filtering, seeded train/test split
//! - [`preprocessing`] - Normalizer fitted on the training partition
//! - [`training`] - Regressors, the model registry and the training engine
//!
//! ## Serving
//! - [`artifacts`] - Run directories with atomic publication
//! - [`inference`] - Prediction service over a swappable artifact set
//! - [`server`] - HTTP API
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Pipeline
pub mod features;
pub mod dataset;
pub mod preprocessing;
pub mod training;

// Serving
pub mod artifacts;
pub mod inference;
pub mod server;
pub mod cli;

pub use error::{Result, TripcastError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::artifacts::{ArtifactKey, ArtifactStore, RunManifest};
    pub use crate::dataset::{load_csv, DatasetPreparer, PreparedDataset};
    pub use crate::error::{Result, TripcastError};
    pub use crate::features::{extract, FeatureRecord, FeatureSchema, RawObservation};
    pub use crate::inference::{ArtifactSet, PredictionService, Predictions};
    pub use crate::preprocessing::{NormalizerState, ScalerType};
    pub use crate::training::{
        InputMode, MetricsReport, ModelParams, ModelRegistry, ModelSpec, Regressor, TrainEngine,
        TrainingConfig, TrainingRun,
    };
}
