//! Prediction service core
//!
//! Loads a published run as one immutable [`ArtifactSet`] and answers
//! single-observation requests with one prediction per model.

mod artifact_set;
mod service;

pub use artifact_set::{ArtifactSet, Predictions};
pub use service::PredictionService;
