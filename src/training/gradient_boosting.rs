//! Gradient boosted regression trees
//!
//! Squared-loss boosting: each round fits a shallow tree to the current
//! residuals on a seeded row/column subsample and adds a shrunken copy of
//! its output to every row's running prediction.

use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use super::decision_tree::DecisionTree;
use super::models::{validate_fit_inputs, validate_predict_input, Regressor};
use crate::error::{Result, TripcastError};

/// Gradient Boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (trees)
    pub n_estimators: usize,
    /// Learning rate (shrinkage)
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_leaf: usize,
    /// Row fraction drawn for each tree
    pub subsample: f64,
    /// Column fraction drawn for each tree
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_leaf: 1,
            subsample: 0.8,
            colsample_bytree: 1.0,
            random_state: 42,
        }
    }
}

impl GradientBoostingConfig {
    fn validate(&self) -> Result<()> {
        let fraction_ok = |f: f64| f > 0.0 && f <= 1.0;
        if self.n_estimators == 0 {
            return Err(TripcastError::training("gradient_boosting", "n_estimators must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TripcastError::training("gradient_boosting", "learning_rate must be positive"));
        }
        if !fraction_ok(self.subsample) || !fraction_ok(self.colsample_bytree) {
            return Err(TripcastError::training(
                "gradient_boosting",
                "subsample and colsample_bytree must be in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Gradient Boosting Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    config: GradientBoostingConfig,
    trees: Vec<DecisionTree>,
    col_indices_per_tree: Vec<Vec<usize>>,
    initial_prediction: f64,
    feature_importances: Vec<f64>,
    n_features: usize,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostingRegressor {
    pub fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            col_indices_per_tree: Vec::new(),
            initial_prediction: 0.0,
            feature_importances: Vec::new(),
            n_features: 0,
        }
    }

    pub fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Fit the gradient boosting model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_inputs("gradient_boosting", x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        let n_features = x.ncols();
        self.n_features = n_features;
        self.trees.clear();
        self.col_indices_per_tree.clear();

        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.feature_importances = vec![0.0; n_features];

        for _ in 0..self.config.n_estimators {
            let residuals = y - &predictions;

            let sample_indices = sample_sorted(n_samples, self.config.subsample, &mut rng);
            let col_indices = sample_sorted(n_features, self.config.colsample_bytree, &mut rng);

            let x_cols = x.select(Axis(1), &col_indices);
            let x_sub = x_cols.select(Axis(0), &sample_indices);
            let y_sub = residuals.select(Axis(0), &sample_indices);

            let mut tree = DecisionTree::new()
                .with_max_depth(self.config.max_depth)
                .with_min_samples_leaf(self.config.min_samples_leaf)
                .with_random_state(rng.gen());
            tree.fit(&x_sub, &y_sub)?;

            // every row moves, not only the sampled ones
            let tree_pred = tree.predict(&x_cols)?;
            predictions.scaled_add(self.config.learning_rate, &tree_pred);

            if let Some(tree_importance) = tree.feature_importances() {
                for (&col_idx, &imp) in col_indices.iter().zip(tree_importance.iter()) {
                    self.feature_importances[col_idx] += imp;
                }
            }

            self.trees.push(tree);
            self.col_indices_per_tree.push(col_indices);
        }

        let total: f64 = self.feature_importances.iter().sum();
        if total > 0.0 {
            for imp in &mut self.feature_importances {
                *imp /= total;
            }
        }

        Ok(())
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TripcastError::ModelNotFitted);
        }
        validate_predict_input(self.n_features, x)?;

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, col_indices) in self.trees.iter().zip(self.col_indices_per_tree.iter()) {
            let x_sub = x.select(Axis(1), col_indices);
            predictions.scaled_add(self.config.learning_rate, &tree.predict(&x_sub)?);
        }
        Ok(predictions)
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

/// `ceil(n * fraction)` distinct indices in ascending order
fn sample_sorted(n: usize, fraction: f64, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
    let sample_size = ((n as f64) * fraction).ceil() as usize;
    let mut indices: Vec<usize> = (0..n).collect();
    if sample_size < n {
        indices.shuffle(rng);
        indices.truncate(sample_size.max(1));
        indices.sort_unstable();
    }
    indices
}

impl Regressor for GradientBoostingRegressor {
    fn name(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        GradientBoostingRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        GradientBoostingRegressor::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| ((i * (j + 3) + j) % 13) as f64);
        let y = Array1::from_shape_fn(n, |i| 2.0 * x[[i, 0]] + 0.5 * x[[i, 1]] * x[[i, 1]]);
        (x, y)
    }

    #[test]
    fn test_fits_training_data() {
        let (x, y) = make_data(120);
        let mut model = GradientBoostingRegressor::default();
        model.fit(&x, &y).unwrap();
        assert_eq!(model.n_trees(), 100);

        let pred = model.predict(&x).unwrap();
        let mse = (&pred - &y).mapv(|e| e * e).mean().unwrap();
        let var = y.mapv(|v| (v - y.mean().unwrap()).powi(2)).mean().unwrap();
        assert!(mse < 0.05 * var, "mse {} vs variance {}", mse, var);
    }

    #[test]
    fn test_seeded_runs_match() {
        let (x, y) = make_data(60);
        let config = GradientBoostingConfig {
            n_estimators: 20,
            colsample_bytree: 0.67,
            random_state: 9,
            ..Default::default()
        };
        let mut a = GradientBoostingRegressor::new(config.clone());
        let mut b = GradientBoostingRegressor::new(config);
        a.fit(&x, &y).unwrap();
        b.fit(&x, &y).unwrap();
        assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
    }

    #[test]
    fn test_invalid_subsample() {
        let (x, y) = make_data(10);
        let mut model = GradientBoostingRegressor::new(GradientBoostingConfig {
            subsample: 0.0,
            ..Default::default()
        });
        assert!(matches!(model.fit(&x, &y), Err(TripcastError::Training { .. })));
    }

    #[test]
    fn test_sample_sorted() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        let idx = sample_sorted(10, 0.5, &mut rng);
        assert_eq!(idx.len(), 5);
        assert!(idx.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(sample_sorted(4, 1.0, &mut rng), vec![0, 1, 2, 3]);
    }
}
