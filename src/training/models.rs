//! Regressor trait and evaluation metrics

use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Metrics for regression evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Error
    pub mae: f64,
    /// R-squared
    pub r2: f64,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(TripcastError::Shape {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(TripcastError::Data(
                "cannot evaluate on an empty partition".to_string(),
            ));
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        let mae: f64 = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();

        // constant targets: perfect fit scores 1, anything else 0
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            n_samples: y_true.len(),
        })
    }
}

/// A regressor that can be fitted and queried through one uniform interface
pub trait Regressor: Send + Sync {
    /// Registry-independent family name
    fn name(&self) -> &'static str;

    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    fn is_fitted(&self) -> bool;
}

/// Shape and finiteness checks shared by every `fit`.
pub(crate) fn validate_fit_inputs(model: &str, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(TripcastError::Shape {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(TripcastError::training(model, "empty training matrix"));
    }
    if x.iter().any(|v| !v.is_finite()) {
        return Err(TripcastError::training(model, "training features contain non-finite values"));
    }
    if y.iter().any(|v| !v.is_finite()) {
        return Err(TripcastError::training(model, "training targets contain non-finite values"));
    }
    Ok(())
}

/// Column count check shared by every `predict`.
pub(crate) fn validate_predict_input(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(TripcastError::Shape {
            expected: format!("{} features", expected),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
