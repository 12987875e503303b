//! Ordinary least squares regression

use super::models::{validate_fit_inputs, validate_predict_input, Regressor};
use crate::error::{Result, TripcastError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Lower-triangular factor of a symmetric positive-definite matrix
fn cholesky_factor(a: &Array2<f64>) -> Option<Array2<f64>> {
    let n = a.nrows();
    let mut l = Array2::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }
    Some(l)
}

/// Solve `L L^T x = b` by forward then backward substitution
fn substitute(l: &Array2<f64>, b: &Array1<f64>) -> Array1<f64> {
    let n = l.nrows();

    let mut y = Array1::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * y[j];
        }
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    let mut x = Array1::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (y[i] - sum) / l[[i, i]];
    }
    x
}

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a tiny ridge if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    if let Some(l) = cholesky_factor(a) {
        return Some(substitute(&l, b));
    }

    let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
    let mut a_reg = a.clone();
    for k in 0..n {
        a_reg[[k, k]] += ridge;
    }
    cholesky_factor(&a_reg).map(|l| substitute(&l, b))
}

/// Matrix inversion using Gauss-Jordan elimination with partial pivoting (fallback)
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    let mut aug = Array2::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }

        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    let mut inv = Array2::zeros((n, n));
    for i in 0..n {
        for j in 0..n {
            inv[[i, j]] = aug[[i, n + j]];
        }
    }
    Some(inv)
}

/// Solve `(X^T X + alpha I) w = X^T y`, Cholesky first, Gauss-Jordan second
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Option<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    if alpha > 0.0 {
        for i in 0..xtx.nrows() {
            xtx[[i, i]] += alpha;
        }
    }
    let xty = x.t().dot(y);

    cholesky_solve(&xtx, &xty).or_else(|| matrix_inverse(&xtx).map(|inv| inv.dot(&xty)))
}

/// Linear regression model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    pub intercept: Option<f64>,
    /// Whether to fit intercept
    pub fit_intercept: bool,
    /// Regularization strength (L2); zero for plain least squares
    pub alpha: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            coefficients: None,
            intercept: None,
            fit_intercept: true,
            alpha: 0.0,
        }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Fit the model to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        validate_fit_inputs("linear_regression", x, y)?;

        // Centering keeps X^T X well conditioned for raw coordinates
        let (x_work, y_work, means) = if self.fit_intercept {
            let x_mean = x
                .mean_axis(Axis(0))
                .ok_or_else(|| TripcastError::training("linear_regression", "empty training matrix"))?;
            let y_mean = y.mean().unwrap_or(0.0);
            let x_centered = x - &x_mean.view().insert_axis(Axis(0));
            let y_centered = y - y_mean;
            (x_centered, y_centered, Some((x_mean, y_mean)))
        } else {
            (x.to_owned(), y.to_owned(), None)
        };

        let coefficients = solve_normal_equations(&x_work, &y_work, self.alpha).ok_or_else(|| {
            TripcastError::training("linear_regression", "normal equations are singular")
        })?;

        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(TripcastError::training(
                "linear_regression",
                "solution contains non-finite coefficients",
            ));
        }

        let intercept = match means {
            Some((x_mean, y_mean)) => y_mean - coefficients.dot(&x_mean),
            None => 0.0,
        };

        self.coefficients = Some(coefficients);
        self.intercept = Some(intercept);
        Ok(self)
    }

    /// Make predictions
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let coefficients = self.coefficients.as_ref().ok_or(TripcastError::ModelNotFitted)?;
        validate_predict_input(coefficients.len(), x)?;
        Ok(x.dot(coefficients) + self.intercept.unwrap_or(0.0))
    }
}

impl Regressor for LinearRegression {
    fn name(&self) -> &'static str {
        "linear_regression"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LinearRegression::fit(self, x, y).map(|_| ())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LinearRegression::predict(self, x)
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}
