//! Feature scaling fitted on the training partition

use crate::error::{Result, TripcastError};
use crate::features::FeatureRecord;
use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerType {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard,
    /// Min-Max scaling: (x - min) / (max - min)
    MinMax,
}

impl Default for ScalerType {
    fn default() -> Self {
        Self::Standard
    }
}

impl std::str::FromStr for ScalerType {
    type Err = TripcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "standard" => Ok(ScalerType::Standard),
            "minmax" | "min_max" => Ok(ScalerType::MinMax),
            other => Err(TripcastError::Config(format!("Unknown scaler type '{}'", other))),
        }
    }
}

/// Learned per-feature center and scale.
///
/// Fitted once on the training partition and never refitted; applying it is
/// a pure linear map `(x - center) / scale`, field for field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizerState {
    pub scaler_type: ScalerType,
    pub feature_names: Vec<String>,
    /// mean or min
    pub center: Vec<f64>,
    /// population std or range; never zero
    pub scale: Vec<f64>,
    pub n_samples: usize,
}

impl NormalizerState {
    /// Fit on the rows of `x`, whose columns are named by `feature_names`.
    pub fn fit(scaler_type: ScalerType, feature_names: &[String], x: &Array2<f64>) -> Result<Self> {
        if x.ncols() != feature_names.len() {
            return Err(TripcastError::Shape {
                expected: format!("{} columns", feature_names.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        if x.nrows() == 0 {
            return Err(TripcastError::Data(
                "cannot fit normalizer on an empty training partition".to_string(),
            ));
        }

        let (center, scale): (Vec<f64>, Vec<f64>) = x
            .axis_iter(Axis(1))
            .map(|col| {
                let n = col.len() as f64;
                match scaler_type {
                    ScalerType::Standard => {
                        let mean = col.sum() / n;
                        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                        (mean, floor_scale(var.sqrt()))
                    }
                    ScalerType::MinMax => {
                        let min = col.iter().copied().fold(f64::INFINITY, f64::min);
                        let max = col.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                        (min, floor_scale(max - min))
                    }
                }
            })
            .unzip();

        if center.iter().chain(scale.iter()).any(|v| !v.is_finite()) {
            return Err(TripcastError::Data(
                "training features contain non-finite values".to_string(),
            ));
        }

        Ok(Self {
            scaler_type,
            feature_names: feature_names.to_vec(),
            center,
            scale,
            n_samples: x.nrows(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    fn check_names<S: AsRef<str>>(&self, names: &[S]) -> Result<()> {
        let matches = names.len() == self.feature_names.len()
            && names
                .iter()
                .zip(self.feature_names.iter())
                .all(|(a, b)| a.as_ref() == b);
        if matches {
            Ok(())
        } else {
            Err(TripcastError::SchemaMismatch {
                expected: format!("{:?}", self.feature_names),
                actual: format!(
                    "{:?}",
                    names.iter().map(|n| n.as_ref()).collect::<Vec<_>>()
                ),
            })
        }
    }

    /// Standardize a single record, preserving its schema and field order.
    pub fn apply(&self, record: &FeatureRecord) -> Result<FeatureRecord> {
        self.check_names(record.names())?;
        let values = record
            .values()
            .iter()
            .zip(self.center.iter().zip(self.scale.iter()))
            .map(|(v, (c, s))| (v - c) / s)
            .collect();
        FeatureRecord::new(record.schema(), values)
    }

    /// Standardize a matrix whose columns are named by `feature_names`.
    pub fn transform<S: AsRef<str>>(&self, feature_names: &[S], x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_names(feature_names)?;
        if x.ncols() != self.n_features() {
            return Err(TripcastError::Shape {
                expected: format!("{} columns", self.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (c, s) = (self.center[j], self.scale[j]);
            col.mapv_inplace(|v| (v - c) / s);
        }
        Ok(out)
    }

    /// Map standardized values back to the raw feature space
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(TripcastError::Shape {
                expected: format!("{} columns", self.n_features()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        let mut out = x.to_owned();
        for (j, mut col) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (c, s) = (self.center[j], self.scale[j]);
            col.mapv_inplace(|v| v * s + c);
        }
        Ok(out)
    }
}

/// Zero-spread features pass through centered but unscaled.
fn floor_scale(scale: f64) -> f64 {
    if scale.abs() < f64::EPSILON {
        1.0
    } else {
        scale
    }
}
