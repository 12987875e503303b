//! Random Forest regressor

use super::decision_tree::{DecisionTree, MaxFeatures};
use super::models::{validate_fit_inputs, validate_predict_input, Regressor};
use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Bagged ensemble of regression trees
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features considered at each split
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub random_state: u64,
    feature_importances: Option<Array1<f64>>,
    n_features: usize,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self::new(100)
    }
}

impl RandomForest {
    /// Regression forest; every split considers all features unless told otherwise
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            bootstrap: true,
            random_state: 42,
            feature_importances: None,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples;
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples;
        self
    }

    pub fn with_max_features(mut self, max_features: MaxFeatures) -> Self {
        self.max_features = max_features;
        self
    }

    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the forest to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        validate_fit_inputs("random_forest", x, y)?;
        if self.n_estimators == 0 {
            return Err(TripcastError::training("random_forest", "n_estimators must be at least 1"));
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        let base_seed = self.random_state;

        // Each tree owns its seed, so the forest is identical however rayon schedules it
        let trees: Vec<DecisionTree> = (0..self.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let seed = base_seed.wrapping_add(tree_idx as u64);
                let mut rng = ChaCha8Rng::seed_from_u64(seed);

                let (x_fit, y_fit) = if self.bootstrap {
                    let sample_indices: Vec<usize> =
                        (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();
                    (
                        x.select(Axis(0), &sample_indices),
                        y.select(Axis(0), &sample_indices),
                    )
                } else {
                    (x.to_owned(), y.to_owned())
                };

                let mut tree = DecisionTree::new()
                    .with_min_samples_split(self.min_samples_split)
                    .with_min_samples_leaf(self.min_samples_leaf)
                    .with_max_features(self.max_features)
                    .with_random_state(rng.gen());
                if let Some(d) = self.max_depth {
                    tree = tree.with_max_depth(d);
                }

                tree.fit(&x_fit, &y_fit)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.compute_feature_importances();
        Ok(self)
    }

    fn compute_feature_importances(&mut self) {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            if let Some(imp) = tree.feature_importances() {
                for (acc, &val) in total.iter_mut().zip(imp.iter()) {
                    *acc += val;
                }
            }
        }

        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            for imp in &mut total {
                *imp /= sum;
            }
        }
        self.feature_importances = Some(Array1::from_vec(total));
    }

    /// Mean of the per-tree predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(TripcastError::ModelNotFitted);
        }
        validate_predict_input(self.n_features, x)?;

        let per_tree = self
            .trees
            .par_iter()
            .map(|tree| tree.predict(x))
            .collect::<Result<Vec<_>>>()?;

        // summed in tree order so the float result is reproducible
        let sum = per_tree
            .iter()
            .fold(Array1::zeros(x.nrows()), |acc, p| acc + p);
        Ok(sum / self.trees.len() as f64)
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Regressor for RandomForest {
    fn name(&self) -> &'static str {
        "random_forest"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        RandomForest::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        RandomForest::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
