//! Training configuration

use crate::error::{Result, TripcastError};
use crate::features::FeatureSchema;
use crate::preprocessing::ScalerType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default outlier bound on the target, in seconds (ten hours)
pub const DEFAULT_MAX_TARGET: f64 = 36_000.0;

/// Configuration for a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Feature contract the models are fitted against
    pub schema: FeatureSchema,

    /// Target column name
    pub target_column: String,

    /// Rows with a target above this bound are dropped
    pub max_target: f64,

    /// Fraction of filtered rows held out for evaluation
    pub test_size: f64,

    /// Seed for the train/test shuffle. Models carry their own seeds in
    /// their registry params.
    pub random_state: u64,

    /// Scaling applied for standardized-mode models
    pub scaler: ScalerType,

    /// Fit registry entries concurrently
    pub parallel: bool,

    /// Worker threads for concurrent fitting (None = all cores)
    pub n_jobs: Option<usize>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            schema: FeatureSchema::PickupOnly,
            target_column: "trip_duration".to_string(),
            max_target: DEFAULT_MAX_TARGET,
            test_size: 0.2,
            random_state: 42,
            scaler: ScalerType::Standard,
            parallel: true,
            n_jobs: None,
        }
    }
}

impl TrainingConfig {
    /// Create a config for the given feature schema
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    pub fn with_target(mut self, column: impl Into<String>) -> Self {
        self.target_column = column.into();
        self
    }

    pub fn with_max_target(mut self, bound: f64) -> Self {
        self.max_target = bound;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_scaler(mut self, scaler: ScalerType) -> Self {
        self.scaler = scaler;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_n_jobs(mut self, n_jobs: usize) -> Self {
        self.n_jobs = Some(n_jobs);
        self
    }

    /// Reject settings that cannot produce a usable split.
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TripcastError::InvalidParameter {
                name: "test_size".to_string(),
                value: self.test_size.to_string(),
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }
        if !(self.max_target.is_finite() && self.max_target > 0.0) {
            return Err(TripcastError::InvalidParameter {
                name: "max_target".to_string(),
                value: self.max_target.to_string(),
                reason: "must be a positive finite number".to_string(),
            });
        }
        if self.target_column.trim().is_empty() {
            return Err(TripcastError::Config("target column must not be empty".to_string()));
        }
        if self.n_jobs == Some(0) {
            return Err(TripcastError::InvalidParameter {
                name: "n_jobs".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Load a config from a JSON file; absent keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TripcastError::Config(format!("cannot read {}: {}", path.as_ref().display(), e))
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TrainingConfig::default();
        assert_eq!(config.target_column, "trip_duration");
        assert_eq!(config.max_target, 36_000.0);
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.random_state, 42);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_test_size() {
        assert!(TrainingConfig::default().with_test_size(0.0).validate().is_err());
        assert!(TrainingConfig::default().with_test_size(1.0).validate().is_err());
        assert!(TrainingConfig::default().with_n_jobs(0).validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrainingConfig =
            serde_json::from_str(r#"{"schema": "pickup_dropoff", "max_target": 7200}"#).unwrap();
        assert_eq!(config.schema, FeatureSchema::PickupDropoff);
        assert_eq!(config.max_target, 7200.0);
        assert_eq!(config.test_size, 0.2);
    }
}
