//! CART regression tree

use super::models::{validate_fit_inputs, validate_predict_input, Regressor};
use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Nodes at least this large scan candidate features in parallel
const PARALLEL_SPLIT_MIN: usize = 2048;

/// Decision tree node; children are indices into the tree's node arena
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf {
        value: f64,
        n_samples: usize,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: usize,
        right: usize,
        n_samples: usize,
        /// Variance of the targets reaching this node
        impurity: f64,
    },
}

/// How many features each split may consider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    Fraction(f64),
    Fixed(usize),
    All,
}

impl Default for MaxFeatures {
    fn default() -> Self {
        MaxFeatures::All
    }
}

impl MaxFeatures {
    /// Number of candidate features out of `n_features`, at least one
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match *self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt().ceil() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().ceil() as usize,
            MaxFeatures::Fraction(f) => (n_features as f64 * f).ceil() as usize,
            MaxFeatures::Fixed(n) => n,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Best split found for one node
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    /// Reduction in summed squared error
    gain: f64,
}

/// Regression tree minimizing squared error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Flat arena, root last; keeps persisted JSON shallow however deep the tree grows
    nodes: Vec<TreeNode>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Seed for per-split feature sampling
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
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

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        validate_fit_inputs("decision_tree", x, y)?;
        if self.min_samples_split < 2 {
            return Err(TripcastError::InvalidParameter {
                name: "min_samples_split".to_string(),
                value: self.min_samples_split.to_string(),
                reason: "must be at least 2".to_string(),
            });
        }
        if self.min_samples_leaf == 0 {
            return Err(TripcastError::InvalidParameter {
                name: "min_samples_leaf".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let n_features = x.ncols();
        self.n_features = n_features;

        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut nodes = Vec::new();
        self.build_tree(x, y, &indices, 0, &mut importances, &mut rng, &mut nodes);

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        self.nodes = nodes;
        self.feature_importances = Some(Array1::from_vec(importances));
        Ok(self)
    }

    /// Grow the subtree for `indices` into `nodes` and return its root index
    #[allow(clippy::too_many_arguments)]
    fn build_tree(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        depth: usize,
        importances: &mut [f64],
        rng: &mut ChaCha8Rng,
        nodes: &mut Vec<TreeNode>,
    ) -> usize {
        let n_samples = indices.len();
        let (sum, sq_sum) = indices
            .iter()
            .fold((0.0, 0.0), |(s, sq), &i| (s + y[i], sq + y[i] * y[i]));
        let mean = sum / n_samples as f64;
        let impurity = (sq_sum / n_samples as f64 - mean * mean).max(0.0);

        let should_stop = n_samples < self.min_samples_split
            || n_samples < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| depth >= d)
            || impurity <= 1e-12 * (1.0 + mean * mean);

        if should_stop {
            return push_node(nodes, TreeNode::Leaf {
                value: mean,
                n_samples,
            });
        }

        let candidates = self.candidate_features(rng);
        let best = match self.find_best_split(x, y, indices, &candidates, sum, sq_sum) {
            Some(best) => best,
            None => {
                return push_node(nodes, TreeNode::Leaf {
                    value: mean,
                    n_samples,
                })
            }
        };

        let (left_indices, right_indices): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| x[[i, best.feature_idx]] <= best.threshold);

        importances[best.feature_idx] += best.gain;

        let left = self.build_tree(x, y, &left_indices, depth + 1, importances, rng, nodes);
        let right = self.build_tree(x, y, &right_indices, depth + 1, importances, rng, nodes);

        push_node(nodes, TreeNode::Split {
            feature_idx: best.feature_idx,
            threshold: best.threshold,
            left,
            right,
            n_samples,
            impurity,
        })
    }

    /// Features a split may consider, in ascending order
    fn candidate_features(&self, rng: &mut ChaCha8Rng) -> Vec<usize> {
        let k = self.max_features.resolve(self.n_features);
        if k >= self.n_features {
            return (0..self.n_features).collect();
        }
        let mut chosen = sample(rng, self.n_features, k).into_vec();
        chosen.sort_unstable();
        chosen
    }

    /// Sorted sweep per feature using running sums, O(n log n) per feature.
    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        indices: &[usize],
        candidates: &[usize],
        total_sum: f64,
        total_sq: f64,
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;
        let min_leaf = self.min_samples_leaf;

        let scan = |&feature_idx: &usize| -> Option<SplitCandidate> {
            let mut pairs: Vec<(f64, f64)> = indices
                .iter()
                .map(|&i| (x[[i, feature_idx]], y[i]))
                .collect();
            pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            let mut best: Option<SplitCandidate> = None;

            for i in 0..n - 1 {
                let (xv, yv) = pairs[i];
                left_sum += yv;
                left_sq += yv * yv;

                // no threshold separates equal values
                if xv == pairs[i + 1].0 {
                    continue;
                }
                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let left_sse = left_sq - left_sum * left_sum / left_n as f64;
                let right_sse = right_sq - right_sum * right_sum / right_n as f64;
                let gain = parent_sse - left_sse - right_sse;

                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    let next = pairs[i + 1].0;
                    let mid = (xv + next) / 2.0;
                    // adjacent floats: the midpoint can round up onto `next`
                    let threshold = if mid < next { mid } else { xv };
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold,
                        gain,
                    });
                }
            }
            best
        };

        let per_feature: Vec<Option<SplitCandidate>> = if n >= PARALLEL_SPLIT_MIN {
            candidates.par_iter().map(scan).collect()
        } else {
            candidates.iter().map(scan).collect()
        };

        // first feature wins ties so the result does not depend on scheduling
        per_feature.into_iter().flatten().fold(None, |acc, cand| match acc {
            Some(best) if best.gain >= cand.gain => Some(best),
            _ => Some(cand),
        })
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.nodes.is_empty() {
            return Err(TripcastError::ModelNotFitted);
        }
        validate_predict_input(self.n_features, x)?;
        Ok(x.rows().into_iter().map(|row| self.predict_row(row)).collect())
    }

    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn get_depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        // children always precede their parent in the arena
        let mut depth = vec![0usize; self.nodes.len()];
        for (i, node) in self.nodes.iter().enumerate() {
            depth[i] = match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + depth[*left].max(depth[*right]),
            };
        }
        depth[self.nodes.len() - 1]
    }

    pub fn get_n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = self.nodes.len() - 1;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    idx = if row[*feature_idx] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

fn push_node(nodes: &mut Vec<TreeNode>, node: TreeNode) -> usize {
    nodes.push(node);
    nodes.len() - 1
}

impl Regressor for DecisionTree {
    fn name(&self) -> &'static str {
        "decision_tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        DecisionTree::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        DecisionTree::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        !self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regressor_simple() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![1.0, 2.0, 3.0, 4.0, 5.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        // fully grown tree reproduces distinct training points
        let predictions = tree.predict(&x).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-12);
        }
    }

    #[test]
    fn test_step_function_threshold() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = array![5.0, 5.0, 5.0, 50.0, 50.0, 50.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        assert_eq!(tree.get_n_leaves(), 2);
        let pred = tree.predict(&array![[5.9], [6.1]]).unwrap();
        assert_eq!(pred[0], 5.0);
        assert_eq!(pred[1], 50.0);
    }

    #[test]
    fn test_max_depth() {
        let x = Array2::from_shape_fn((32, 2), |(i, j)| (i * (j + 1)) as f64);
        let y = Array1::from_shape_fn(32, |i| (i * i) as f64);

        let mut tree = DecisionTree::new().with_max_depth(3);
        tree.fit(&x, &y).unwrap();
        assert!(tree.get_depth() <= 4);
        assert!(tree.get_n_leaves() <= 8);
    }

    #[test]
    fn test_feature_importances() {
        let x = array![[1.0, 0.0], [2.0, 0.0], [3.0, 0.0], [4.0, 0.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];

        let mut tree = DecisionTree::new();
        tree.fit(&x, &y).unwrap();

        let importances = tree.feature_importances().unwrap();
        assert_eq!(importances[0], 1.0);
        assert_eq!(importances[1], 0.0);
    }

    #[test]
    fn test_feature_sampling_is_seeded() {
        let x = Array2::from_shape_fn((60, 5), |(i, j)| ((i * 7 + j * 13) % 17) as f64);
        let y = Array1::from_shape_fn(60, |i| x[[i, 0]] * 2.0 + x[[i, 3]]);

        let fit = |seed| {
            let mut tree = DecisionTree::new()
                .with_max_features(MaxFeatures::Fixed(2))
                .with_random_state(seed);
            tree.fit(&x, &y).unwrap();
            tree.predict(&x).unwrap()
        };
        assert_eq!(fit(3), fit(3));
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(7), 3);
        assert_eq!(MaxFeatures::All.resolve(11), 11);
        assert_eq!(MaxFeatures::Fixed(20).resolve(7), 7);
        assert_eq!(MaxFeatures::Fraction(0.0).resolve(7), 1);
    }

    #[test]
    fn test_predict_wrong_width() {
        let mut tree = DecisionTree::new();
        tree.fit(&array![[1.0, 2.0], [2.0, 1.0]], &array![1.0, 2.0]).unwrap();
        assert!(tree.predict(&array![[1.0]]).is_err());
    }
}
