//! Outlier filtering, feature extraction and the seeded train/test split

use crate::error::{Result, TripcastError};
use crate::features::{extract, FeatureRecord, FeatureSchema, RawObservation};
use crate::training::TrainingConfig;
use ndarray::{Array1, Array2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Row counts from one preparation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparationReport {
    pub rows_loaded: usize,
    /// Target missing, non-positive or above the bound
    pub rows_out_of_range: usize,
    /// Features could not be extracted
    pub rows_invalid: usize,
    pub rows_retained: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// Train and test partitions, disjoint, covering every retained row.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub schema: FeatureSchema,
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
    /// Positions of the training rows in the input slice
    pub train_rows: Vec<usize>,
    /// Positions of the test rows in the input slice
    pub test_rows: Vec<usize>,
    pub report: PreparationReport,
}

impl PreparedDataset {
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}

/// Prepares raw observations for training.
#[derive(Debug, Clone)]
pub struct DatasetPreparer {
    schema: FeatureSchema,
    max_target: f64,
    test_size: f64,
    random_state: u64,
}

impl DatasetPreparer {
    pub fn new(schema: FeatureSchema) -> Self {
        let defaults = TrainingConfig::default();
        Self {
            schema,
            max_target: defaults.max_target,
            test_size: defaults.test_size,
            random_state: defaults.random_state,
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self {
            schema: config.schema,
            max_target: config.max_target,
            test_size: config.test_size,
            random_state: config.random_state,
        }
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

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    /// A target is kept when present, finite and in `(0, max_target]`.
    pub fn keeps_target(&self, target: Option<f64>) -> bool {
        matches!(target, Some(t) if t.is_finite() && t > 0.0 && t <= self.max_target)
    }

    /// Filter, extract and split `rows`.
    pub fn prepare(&self, rows: &[RawObservation]) -> Result<PreparedDataset> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(TripcastError::InvalidParameter {
                name: "test_size".to_string(),
                value: self.test_size.to_string(),
                reason: "must be strictly between 0 and 1".to_string(),
            });
        }

        let in_range: Vec<usize> = (0..rows.len())
            .filter(|&i| self.keeps_target(rows[i].trip_duration))
            .collect();
        let rows_out_of_range = rows.len() - in_range.len();

        let extracted: Vec<(usize, Result<FeatureRecord>)> = in_range
            .par_iter()
            .map(|&i| (i, extract(self.schema, &rows[i])))
            .collect();

        let mut retained: Vec<(usize, FeatureRecord, f64)> = Vec::with_capacity(extracted.len());
        let mut rows_invalid = 0usize;
        for (i, outcome) in extracted {
            match outcome {
                Ok(record) => {
                    // keeps_target guarantees the target is present
                    let target = rows[i].trip_duration.unwrap_or_default();
                    retained.push((i, record, target));
                }
                Err(e) => {
                    rows_invalid += 1;
                    if rows_invalid <= 5 {
                        warn!(row = i, error = %e, "Dropping row with invalid features");
                    }
                }
            }
        }
        if rows_invalid > 5 {
            warn!(count = rows_invalid, "Dropped rows with invalid features");
        }

        if retained.is_empty() {
            return Err(TripcastError::Data(format!(
                "dataset is empty after filtering ({} loaded, {} out of range, {} invalid)",
                rows.len(),
                rows_out_of_range,
                rows_invalid
            )));
        }

        let (train_pos, test_pos) = self.split_positions(retained.len())?;
        let n_features = self.schema.n_features();

        let matrix = |positions: &[usize]| {
            Array2::from_shape_fn((positions.len(), n_features), |(r, c)| {
                retained[positions[r]].1.values()[c]
            })
        };
        let targets = |positions: &[usize]| {
            positions.iter().map(|&p| retained[p].2).collect::<Array1<f64>>()
        };

        let report = PreparationReport {
            rows_loaded: rows.len(),
            rows_out_of_range,
            rows_invalid,
            rows_retained: retained.len(),
            train_rows: train_pos.len(),
            test_rows: test_pos.len(),
        };
        info!(
            loaded = report.rows_loaded,
            out_of_range = report.rows_out_of_range,
            invalid = report.rows_invalid,
            train = report.train_rows,
            test = report.test_rows,
            "Dataset prepared"
        );

        Ok(PreparedDataset {
            schema: self.schema,
            feature_names: self.schema.feature_names_owned(),
            x_train: matrix(&train_pos),
            y_train: targets(&train_pos),
            x_test: matrix(&test_pos),
            y_test: targets(&test_pos),
            train_rows: train_pos.iter().map(|&p| retained[p].0).collect(),
            test_rows: test_pos.iter().map(|&p| retained[p].0).collect(),
            report,
        })
    }

    /// Shuffle `0..n` with the seed and cut off `ceil(n * test_size)` for testing.
    pub fn split_positions(&self, n: usize) -> Result<(Vec<usize>, Vec<usize>)> {
        let n_test = (n as f64 * self.test_size).ceil() as usize;
        if n < 2 || n_test == 0 || n_test >= n {
            return Err(TripcastError::Data(format!(
                "{} retained rows cannot be split with test_size {}",
                n, self.test_size
            )));
        }

        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        order.shuffle(&mut rng);

        let train = order.split_off(n_test);
        Ok((train, order))
    }
}
