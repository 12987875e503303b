//! K-Nearest Neighbors regressor

use super::models::{validate_fit_inputs, validate_predict_input, Regressor};
use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Distance metric for KNN
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    Euclidean,
    Manhattan,
    Minkowski(f64),
}

impl Default for DistanceMetric {
    fn default() -> Self {
        Self::Euclidean
    }
}

/// Weighting scheme for neighbors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightScheme {
    /// All neighbors have equal weight
    Uniform,
    /// Inverse distance
    Distance,
}

impl Default for WeightScheme {
    fn default() -> Self {
        Self::Uniform
    }
}

/// KNN configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KNNConfig {
    pub n_neighbors: usize,
    pub metric: DistanceMetric,
    pub weights: WeightScheme,
}

impl Default for KNNConfig {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            metric: DistanceMetric::Euclidean,
            weights: WeightScheme::Uniform,
        }
    }
}

/// K-Nearest Neighbors Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KNNRegressor {
    config: KNNConfig,
    x_train: Option<Array2<f64>>,
    y_train: Option<Array1<f64>>,
}

impl KNNRegressor {
    pub fn new(config: KNNConfig) -> Self {
        Self {
            config,
            x_train: None,
            y_train: None,
        }
    }

    /// Create with default config and specified k
    pub fn with_k(k: usize) -> Self {
        Self::new(KNNConfig {
            n_neighbors: k,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &KNNConfig {
        &self.config
    }

    /// Fit the regressor (stores training data)
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_inputs("knn", x, y)?;
        if self.config.n_neighbors == 0 {
            return Err(TripcastError::training("knn", "n_neighbors must be at least 1"));
        }
        if let DistanceMetric::Minkowski(p) = self.config.metric {
            if !(p.is_finite() && p >= 1.0) {
                return Err(TripcastError::training("knn", format!("Minkowski p must be >= 1, got {}", p)));
            }
        }
        self.x_train = Some(x.to_owned());
        self.y_train = Some(y.to_owned());
        Ok(())
    }

    /// Predict target values (parallelized over query rows)
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (x_train, y_train) = match (&self.x_train, &self.y_train) {
            (Some(x_train), Some(y_train)) => (x_train, y_train),
            _ => return Err(TripcastError::ModelNotFitted),
        };
        validate_predict_input(x_train.ncols(), x)?;

        // fewer training rows than k: use all of them
        let k = self.config.n_neighbors.min(x_train.nrows());
        let metric = self.config.metric;
        let weights = self.config.weights;

        let predictions: Vec<f64> = (0..x.nrows())
            .into_par_iter()
            .map(|i| {
                let neighbors = find_k_nearest(x.row(i), x_train, y_train, k, metric);
                weighted_mean_from(&neighbors, weights)
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}

impl Regressor for KNNRegressor {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        KNNRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        KNNRegressor::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        self.x_train.is_some()
    }
}

/// Max-heap entry keyed on distance, so the farthest kept neighbor is on top
#[derive(PartialEq)]
struct DistLabel(f64, f64);

impl Eq for DistLabel {}
impl PartialOrd for DistLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for DistLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Find k nearest neighbors with a bounded max-heap, O(n log k)
fn find_k_nearest(
    point: ArrayView1<f64>,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    k: usize,
    metric: DistanceMetric,
) -> Vec<(f64, f64)> {
    let mut heap = BinaryHeap::with_capacity(k + 1);

    for (row, &label) in x_train.rows().into_iter().zip(y_train.iter()) {
        let dist = compute_distance(point, row, metric);
        if heap.len() < k {
            heap.push(DistLabel(dist, label));
        } else if let Some(top) = heap.peek() {
            if dist < top.0 {
                heap.pop();
                heap.push(DistLabel(dist, label));
            }
        }
    }

    heap.into_sorted_vec().into_iter().map(|dl| (dl.0, dl.1)).collect()
}

fn compute_distance(a: ArrayView1<f64>, b: ArrayView1<f64>, metric: DistanceMetric) -> f64 {
    let diffs = a.iter().zip(b.iter()).map(|(ai, bi)| ai - bi);
    match metric {
        DistanceMetric::Euclidean => diffs.map(|d| d * d).sum::<f64>().sqrt(),
        DistanceMetric::Manhattan => diffs.map(f64::abs).sum(),
        DistanceMetric::Minkowski(p) => diffs.map(|d| d.abs().powf(p)).sum::<f64>().powf(1.0 / p),
    }
}

fn weighted_mean_from(neighbors: &[(f64, f64)], weights: WeightScheme) -> f64 {
    // an exact match dominates under inverse-distance weighting
    if weights == WeightScheme::Distance {
        let exact: Vec<f64> = neighbors
            .iter()
            .filter(|(d, _)| *d == 0.0)
            .map(|&(_, y)| y)
            .collect();
        if !exact.is_empty() {
            return exact.iter().sum::<f64>() / exact.len() as f64;
        }
    }

    let (weighted, total) = neighbors.iter().fold((0.0, 0.0), |(s, w), &(dist, y)| {
        let weight = match weights {
            WeightScheme::Uniform => 1.0,
            WeightScheme::Distance => 1.0 / dist,
        };
        (s + weight * y, w + weight)
    });
    if total > 0.0 {
        weighted / total
    } else {
        0.0
    }
}
