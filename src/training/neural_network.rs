//! Multi-layer perceptron regressor
//!
//! Feedforward network trained by mini-batch SGD with momentum. Targets are
//! standardized internally, so trip durations in the thousands of seconds do
//! not blow up the gradients; predictions are mapped back before returning.

use ndarray::{s, Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::models::{validate_fit_inputs, validate_predict_input, Regressor};
use crate::error::{Result, TripcastError};

/// Hidden-layer activation function
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    ReLU,
    Sigmoid,
    Tanh,
    Linear,
}

impl Default for Activation {
    fn default() -> Self {
        Self::ReLU
    }
}

impl Activation {
    fn apply(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| v.max(0.0)),
            Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
            Activation::Tanh => z.mapv(f64::tanh),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(&self, z: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::ReLU => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Sigmoid => z.mapv(|v| {
                let s = 1.0 / (1.0 + (-v).exp());
                s * (1.0 - s)
            }),
            Activation::Tanh => z.mapv(|v| 1.0 - v.tanh().powi(2)),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Neural Network configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MLPConfig {
    pub hidden_layers: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    /// L2 regularization
    pub alpha: f64,
    pub random_state: u64,
    /// Epochs without validation improvement before stopping
    pub early_stopping_patience: usize,
    /// Trailing fraction of the training rows held out for early stopping
    pub validation_split: f64,
    pub momentum: f64,
}

impl Default for MLPConfig {
    fn default() -> Self {
        Self {
            hidden_layers: vec![100, 50],
            activation: Activation::ReLU,
            learning_rate: 0.001,
            max_epochs: 500,
            batch_size: 32,
            alpha: 0.0001,
            random_state: 42,
            early_stopping_patience: 10,
            validation_split: 0.1,
            momentum: 0.9,
        }
    }
}

impl MLPConfig {
    fn validate(&self) -> Result<()> {
        if self.hidden_layers.iter().any(|&h| h == 0) {
            return Err(TripcastError::training("neural_network", "hidden layer sizes must be positive"));
        }
        if self.batch_size == 0 {
            return Err(TripcastError::training("neural_network", "batch_size must be at least 1"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(TripcastError::training("neural_network", "learning_rate must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(TripcastError::training("neural_network", "validation_split must be in [0, 1)"));
        }
        Ok(())
    }
}

/// Multi-Layer Perceptron Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLPRegressor {
    config: MLPConfig,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    n_features: usize,
    /// Target standardization learned at fit time
    y_mean: f64,
    y_scale: f64,
    n_epochs_run: usize,
}

impl Default for MLPRegressor {
    fn default() -> Self {
        Self::new(MLPConfig::default())
    }
}

impl MLPRegressor {
    pub fn new(config: MLPConfig) -> Self {
        Self {
            config,
            weights: Vec::new(),
            biases: Vec::new(),
            n_features: 0,
            y_mean: 0.0,
            y_scale: 1.0,
            n_epochs_run: 0,
        }
    }

    pub fn config(&self) -> &MLPConfig {
        &self.config
    }

    /// Epochs completed by the last fit, early stopping included
    pub fn n_epochs_run(&self) -> usize {
        self.n_epochs_run
    }

    /// Fit the model
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        validate_fit_inputs("neural_network", x, y)?;
        self.config.validate()?;

        let n_samples = x.nrows();
        self.n_features = x.ncols();

        self.y_mean = y.mean().unwrap_or(0.0);
        let std = y.std(0.0);
        self.y_scale = if std > f64::EPSILON { std } else { 1.0 };
        let y_std = y.mapv(|v| (v - self.y_mean) / self.y_scale);

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.initialize_weights(&mut rng);

        let val_size = (n_samples as f64 * self.config.validation_split) as usize;
        let train_size = n_samples - val_size;
        let x_train = x.slice(s![..train_size, ..]);
        let y_train = y_std.slice(s![..train_size]);
        let x_val = x.slice(s![train_size.., ..]).to_owned();
        let y_val = y_std.slice(s![train_size..]).to_owned();

        let mut velocities_w: Vec<Array2<f64>> =
            self.weights.iter().map(|w| Array2::zeros(w.raw_dim())).collect();
        let mut velocities_b: Vec<Array1<f64>> =
            self.biases.iter().map(|b| Array1::zeros(b.len())).collect();

        let mut best_val_loss = f64::INFINITY;
        let mut best_params: Option<(Vec<Array2<f64>>, Vec<Array1<f64>>)> = None;
        let mut patience_counter = 0;
        let decay = 1.0 - self.config.alpha * self.config.learning_rate;

        let mut indices: Vec<usize> = (0..train_size).collect();
        self.n_epochs_run = 0;

        for epoch in 0..self.config.max_epochs {
            indices.shuffle(&mut rng);

            for batch_indices in indices.chunks(self.config.batch_size) {
                let x_batch = x_train.select(Axis(0), batch_indices);
                let y_batch = y_train.select(Axis(0), batch_indices);

                let (activations, z_values) = self.forward(&x_batch);
                let gradients = self.backward(&y_batch, &activations, &z_values);

                for (i, (grad_w, grad_b)) in gradients.into_iter().enumerate() {
                    velocities_w[i] = &velocities_w[i] * self.config.momentum
                        - &grad_w * self.config.learning_rate;
                    velocities_b[i] = &velocities_b[i] * self.config.momentum
                        - &grad_b * self.config.learning_rate;

                    self.weights[i] = (&self.weights[i] + &velocities_w[i]) * decay;
                    self.biases[i] = &self.biases[i] + &velocities_b[i];
                }
            }
            self.n_epochs_run = epoch + 1;

            if self.weights.iter().any(|w| w.iter().any(|v| !v.is_finite())) {
                return Err(TripcastError::training(
                    "neural_network",
                    format!("weights diverged at epoch {}", epoch + 1),
                ));
            }

            if val_size > 0 {
                let val_loss = mse(&y_val, &self.forward_output(&x_val));
                if val_loss < best_val_loss - 1e-6 {
                    best_val_loss = val_loss;
                    best_params = Some((self.weights.clone(), self.biases.clone()));
                    patience_counter = 0;
                } else {
                    patience_counter += 1;
                    if patience_counter >= self.config.early_stopping_patience {
                        debug!(epoch = epoch + 1, val_loss = best_val_loss, "Early stopping");
                        break;
                    }
                }
            }
        }

        if let Some((weights, biases)) = best_params {
            self.weights = weights;
            self.biases = biases;
        }

        Ok(())
    }

    /// Make predictions in the original target units
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.weights.is_empty() {
            return Err(TripcastError::ModelNotFitted);
        }
        validate_predict_input(self.n_features, x)?;
        Ok(self.forward_output(x).mapv(|v| v * self.y_scale + self.y_mean))
    }

    fn initialize_weights(&mut self, rng: &mut Xoshiro256PlusPlus) {
        self.weights.clear();
        self.biases.clear();

        let mut layer_sizes = vec![self.n_features];
        layer_sizes.extend(&self.config.hidden_layers);
        layer_sizes.push(1);

        for pair in layer_sizes.windows(2) {
            let (n_in, n_out) = (pair[0], pair[1]);
            // Xavier/Glorot uniform
            let limit = (6.0 / (n_in + n_out) as f64).sqrt();
            let weights = Array2::from_shape_fn((n_in, n_out), |_| rng.gen_range(-limit..limit));
            self.weights.push(weights);
            self.biases.push(Array1::zeros(n_out));
        }
    }

    fn forward(&self, x: &Array2<f64>) -> (Vec<Array2<f64>>, Vec<Array2<f64>>) {
        let n_layers = self.weights.len();
        let mut activations = vec![x.clone()];
        let mut z_values = Vec::with_capacity(n_layers);

        for (i, (w, b)) in self.weights.iter().zip(self.biases.iter()).enumerate() {
            let z = activations[i].dot(w) + b;
            let a = if i + 1 < n_layers {
                self.config.activation.apply(&z)
            } else {
                // linear output
                z.clone()
            };
            z_values.push(z);
            activations.push(a);
        }

        (activations, z_values)
    }

    /// Standardized-scale output column
    fn forward_output(&self, x: &Array2<f64>) -> Array1<f64> {
        let (activations, _) = self.forward(x);
        activations
            .last()
            .map(|out| out.column(0).to_owned())
            .unwrap_or_else(|| Array1::zeros(x.nrows()))
    }

    fn backward(
        &self,
        y: &Array1<f64>,
        activations: &[Array2<f64>],
        z_values: &[Array2<f64>],
    ) -> Vec<(Array2<f64>, Array1<f64>)> {
        let n = y.len() as f64;
        let mut gradients = Vec::with_capacity(self.weights.len());

        let y_2d = y.view().insert_axis(Axis(1));
        let output = &activations[activations.len() - 1];
        let mut delta = (output - &y_2d) / n;

        for i in (0..self.weights.len()).rev() {
            let grad_w = activations[i].t().dot(&delta);
            let grad_b = delta.sum_axis(Axis(0));
            gradients.push((grad_w, grad_b));

            if i > 0 {
                delta = delta.dot(&self.weights[i].t()) * self.config.activation.derivative(&z_values[i - 1]);
            }
        }

        gradients.reverse();
        gradients
    }
}

fn mse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> f64 {
    y_true
        .iter()
        .zip(y_pred.iter())
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64
}

impl Regressor for MLPRegressor {
    fn name(&self) -> &'static str {
        "neural_network"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        MLPRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        MLPRegressor::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        !self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> MLPConfig {
        MLPConfig {
            hidden_layers: vec![16],
            max_epochs: 300,
            learning_rate: 0.01,
            batch_size: 16,
            validation_split: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_large_scale_linear_target() {
        // standardized inputs, targets in the thousands
        let x = Array2::from_shape_fn((80, 2), |(i, j)| {
            let v = ((i * (j + 2)) % 17) as f64;
            (v - 8.0) / 5.0
        });
        let y = Array1::from_shape_fn(80, |i| 1500.0 + 400.0 * x[[i, 0]] - 250.0 * x[[i, 1]]);

        let mut model = MLPRegressor::new(small_config());
        model.fit(&x, &y).unwrap();

        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().all(|p| p.is_finite()));
        let mse = (&pred - &y).mapv(|e| e * e).mean().unwrap();
        let var = y.var(0.0);
        assert!(mse < 0.2 * var, "mse {} vs variance {}", mse, var);
    }

    #[test]
    fn test_seeded_fit_is_reproducible() {
        let x = Array2::from_shape_fn((30, 3), |(i, j)| ((i + j) % 5) as f64 / 5.0);
        let y = Array1::from_shape_fn(30, |i| (i % 7) as f64);

        let fit = || {
            let mut model = MLPRegressor::new(MLPConfig {
                max_epochs: 20,
                ..small_config()
            });
            model.fit(&x, &y).unwrap();
            model.predict(&x).unwrap()
        };
        assert_eq!(fit(), fit());
    }

    #[test]
    fn test_early_stopping_caps_epochs() {
        let x = Array2::from_shape_fn((50, 1), |(i, _)| i as f64 / 50.0);
        let y = Array1::from_elem(50, 3.0);

        let mut model = MLPRegressor::new(MLPConfig {
            hidden_layers: vec![4],
            learning_rate: 0.01,
            max_epochs: 500,
            validation_split: 0.2,
            early_stopping_patience: 5,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        assert!(model.n_epochs_run() < 500);
        let pred = model.predict(&x).unwrap();
        assert!(pred.iter().all(|p| (p - 3.0).abs() < 1.0));
    }

    #[test]
    fn test_invalid_config() {
        let mut model = MLPRegressor::new(MLPConfig {
            batch_size: 0,
            ..Default::default()
        });
        let x = Array2::zeros((4, 1));
        let y = Array1::zeros(4);
        assert!(matches!(model.fit(&x, &y), Err(TripcastError::Training { .. })));
        assert!(matches!(model.predict(&x), Err(TripcastError::ModelNotFitted)));
    }
}
