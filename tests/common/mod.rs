//! Shared fixtures for integration tests
#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;
use tripcast::prelude::*;

/// Deterministic trips whose duration is an exact linear function of the
/// pickup hour and the latitude difference.
pub fn synthetic_rows(n: usize) -> Vec<RawObservation> {
    let start = NaiveDate::from_ymd_opt(2016, 1, 4)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();

    (0..n)
        .map(|i| {
            let hour = (i % 24) as i64;
            let pickup = start
                + Duration::days(((i * 7) % 150) as i64)
                + Duration::hours(hour)
                + Duration::minutes(((i * 13) % 60) as i64);
            let pickup_lat = 40.70 + ((i * 37) % 100) as f64 * 0.001;
            let dropoff_lat = 40.70 + ((i * 53) % 100) as f64 * 0.001;
            let pickup_lon = -74.01 + ((i * 29) % 100) as f64 * 0.0005;
            let dropoff_lon = -73.99 + ((i * 31) % 100) as f64 * 0.0005;
            let duration = 300.0 + 120.0 * hour as f64 + 1000.0 * (dropoff_lat - pickup_lat);
            let dropoff = pickup + Duration::seconds(duration.round() as i64);

            RawObservation::new(
                pickup.format("%Y-%m-%d %H:%M:%S").to_string(),
                (pickup_lat, pickup_lon),
                (dropoff_lat, dropoff_lon),
            )
            .with_dropoff_datetime(dropoff.format("%Y-%m-%d %H:%M:%S").to_string())
            .with_passenger_count((1 + i % 4) as f64)
            .with_trip_duration(duration)
        })
        .collect()
}

/// Write observations in the layout of the public trip dataset
pub fn write_csv(path: &Path, rows: &[RawObservation]) {
    let mut out = String::from(
        "id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,pickup_longitude,\
         pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag,trip_duration\n",
    );
    for (i, r) in rows.iter().enumerate() {
        writeln!(
            out,
            "id{},{},{},{},{},{},{},{},{},N,{}",
            i,
            1 + i % 2,
            r.pickup_datetime,
            r.dropoff_datetime.as_deref().unwrap_or(""),
            r.passenger_count.unwrap_or(1.0),
            r.pickup_longitude,
            r.pickup_latitude,
            r.dropoff_longitude,
            r.dropoff_latitude,
            r.trip_duration.unwrap_or(0.0),
        )
        .unwrap();
    }
    std::fs::write(path, out).unwrap();
}

pub fn prepared(n: usize) -> PreparedDataset {
    DatasetPreparer::from_config(&TrainingConfig::default())
        .prepare(&synthetic_rows(n))
        .unwrap()
}

pub fn train(registry: &ModelRegistry) -> TrainingRun {
    TrainEngine::new(TrainingConfig::default())
        .run(&prepared(100), registry)
        .unwrap()
}

/// The default registry trained once per test binary
pub fn default_run() -> &'static TrainingRun {
    static RUN: OnceLock<TrainingRun> = OnceLock::new();
    RUN.get_or_init(|| train(&ModelRegistry::default()))
}

/// The default registry minus the neural network, for faster fixtures
pub fn quick_run() -> &'static TrainingRun {
    static RUN: OnceLock<TrainingRun> = OnceLock::new();
    RUN.get_or_init(|| train(&ModelRegistry::default().without("neural_network")))
}

pub fn published(dir: &Path, run: &TrainingRun) -> ArtifactStore {
    let store = ArtifactStore::open(dir).unwrap();
    store.publish(run).unwrap();
    store
}

/// The trip from the service's documentation
pub fn sample_request() -> serde_json::Value {
    serde_json::json!({
        "pickup_datetime": "2023-06-15T08:30:00Z",
        "pickup_latitude": 40.7128,
        "pickup_longitude": -74.0060,
        "dropoff_latitude": 40.7580,
        "dropoff_longitude": -73.9855,
    })
}
