//! Feature extraction: raw observation -> fixed-schema feature record

use super::{FeatureSchema, RawObservation};
use crate::error::{Result, TripcastError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const OFFSET_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
];

/// Parse an ISO-8601 timestamp into its wall-clock date-time.
///
/// A trailing `Z` is read as `+00:00`. With an explicit offset the calendar
/// fields are those of the stated offset; naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let trimmed = raw.trim();
    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(prefix) => format!("{}+00:00", prefix),
        None => trimmed.to_string(),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Ok(dt.naive_local());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, fmt) {
            return Ok(dt.naive_local());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return Ok(dt);
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt);
        }
    }

    Err(TripcastError::Validation(format!(
        "Invalid datetime format: '{}'",
        raw
    )))
}

/// Hour (0-23), day of week (Monday = 0) and month (1-12)
fn calendar_fields(dt: &NaiveDateTime) -> [f64; 3] {
    [
        dt.hour() as f64,
        dt.weekday().num_days_from_monday() as f64,
        dt.month() as f64,
    ]
}

fn finite(field: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TripcastError::Validation(format!(
            "'{}' must be a finite number, got {}",
            field, value
        )))
    }
}

/// An ordered, named vector of feature values built under one schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    schema: FeatureSchema,
    values: Vec<f64>,
}

impl FeatureRecord {
    /// Wrap values already laid out in `schema` order
    pub fn new(schema: FeatureSchema, values: Vec<f64>) -> Result<Self> {
        if values.len() != schema.n_features() {
            return Err(TripcastError::Shape {
                expected: format!("{} values for schema {}", schema.n_features(), schema),
                actual: format!("{} values", values.len()),
            });
        }
        Ok(Self { schema, values })
    }

    pub fn schema(&self) -> FeatureSchema {
        self.schema
    }

    pub fn names(&self) -> &'static [&'static str] {
        self.schema.feature_names()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names()
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        self.names().iter().copied().zip(self.values.iter().copied())
    }

    /// Single-row matrix for model input
    pub fn to_array(&self) -> Array2<f64> {
        Array2::from_shape_fn((1, self.values.len()), |(_, c)| self.values[c])
    }
}

/// Build the feature record for `obs` under `schema`.
///
/// Deterministic and free of side effects.
pub fn extract(schema: FeatureSchema, obs: &RawObservation) -> Result<FeatureRecord> {
    let pickup = parse_timestamp(&obs.pickup_datetime)?;
    let pickup_cal = calendar_fields(&pickup);

    let coords = [
        finite("pickup_longitude", obs.pickup_longitude)?,
        finite("pickup_latitude", obs.pickup_latitude)?,
        finite("dropoff_longitude", obs.dropoff_longitude)?,
        finite("dropoff_latitude", obs.dropoff_latitude)?,
    ];

    let mut values = Vec::with_capacity(schema.n_features());
    values.extend_from_slice(&pickup_cal);

    if schema.requires_dropoff() {
        let dropoff_raw = obs.dropoff_datetime.as_deref().ok_or_else(|| {
            TripcastError::Validation(format!(
                "'dropoff_datetime' is required by feature schema {}",
                schema
            ))
        })?;
        let dropoff = parse_timestamp(dropoff_raw)?;
        values.extend_from_slice(&calendar_fields(&dropoff));
        values.extend_from_slice(&coords);

        let passengers = obs.passenger_count.ok_or_else(|| {
            TripcastError::Validation(format!(
                "'passenger_count' is required by feature schema {}",
                schema
            ))
        })?;
        values.push(finite("passenger_count", passengers)?);
    } else {
        values.extend_from_slice(&coords);
    }

    FeatureRecord::new(schema, values)
}
