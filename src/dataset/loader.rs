//! CSV loading into raw observations

use crate::error::{Result, TripcastError};
use crate::features::{FeatureSchema, RawObservation};
use polars::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Columns every dataset must carry, regardless of schema
pub const REQUIRED_COLUMNS: [&str; 5] = [
    "pickup_datetime",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
];

/// Load a trip CSV file.
///
/// The target column is required; `dropoff_datetime` and `passenger_count`
/// are required only when `schema` needs them.
pub fn load_csv(
    path: impl AsRef<Path>,
    schema: FeatureSchema,
    target_column: &str,
) -> Result<Vec<RawObservation>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(TripcastError::Data(format!("dataset file {} does not exist", path.display())));
    }

    let start = Instant::now();
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(1000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    info!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Dataset loaded"
    );

    observations_from_frame(&df, schema, target_column)
}

/// Convert an already loaded frame into raw observations.
pub fn observations_from_frame(
    df: &DataFrame,
    schema: FeatureSchema,
    target_column: &str,
) -> Result<Vec<RawObservation>> {
    let present: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();

    let mut required: Vec<&str> = REQUIRED_COLUMNS.to_vec();
    required.push(target_column);
    if schema.requires_dropoff() {
        required.push("dropoff_datetime");
        required.push("passenger_count");
    }
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|col| !present.iter().any(|p| p == col))
        .collect();
    if !missing.is_empty() {
        return Err(TripcastError::Data(format!(
            "dataset is missing required columns: {}",
            missing.join(", ")
        )));
    }

    let has = |name: &str| present.iter().any(|p| p == name);

    let pickup_datetime = string_column(df, "pickup_datetime")?;
    let pickup_longitude = float_column(df, "pickup_longitude")?;
    let pickup_latitude = float_column(df, "pickup_latitude")?;
    let dropoff_longitude = float_column(df, "dropoff_longitude")?;
    let dropoff_latitude = float_column(df, "dropoff_latitude")?;
    let target = float_column(df, target_column)?;
    let dropoff_datetime = if has("dropoff_datetime") {
        Some(string_column(df, "dropoff_datetime")?)
    } else {
        None
    };
    let passenger_count = if has("passenger_count") {
        Some(float_column(df, "passenger_count")?)
    } else {
        None
    };

    let rows = (0..df.height())
        .map(|i| RawObservation {
            pickup_datetime: pickup_datetime[i].clone().unwrap_or_default(),
            pickup_longitude: pickup_longitude[i].unwrap_or(f64::NAN),
            pickup_latitude: pickup_latitude[i].unwrap_or(f64::NAN),
            dropoff_longitude: dropoff_longitude[i].unwrap_or(f64::NAN),
            dropoff_latitude: dropoff_latitude[i].unwrap_or(f64::NAN),
            dropoff_datetime: dropoff_datetime.as_ref().and_then(|col| col[i].clone()),
            passenger_count: passenger_count.as_ref().and_then(|col| col[i]),
            trip_duration: target[i],
        })
        .collect();

    Ok(rows)
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| TripcastError::Data(format!("column '{}' not found", name)))?;
    let cast = column.cast(&DataType::Float64)?;
    let values = cast.as_materialized_series().f64()?.into_iter().collect();
    Ok(values)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let column = df
        .column(name)
        .map_err(|_| TripcastError::Data(format!("column '{}' not found", name)))?;
    let cast = column.cast(&DataType::String)?;
    let values = cast
        .as_materialized_series()
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect();
    Ok(values)
}
