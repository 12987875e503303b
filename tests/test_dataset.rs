//! Integration tests for dataset loading, filtering, splitting and scaling

mod common;

use ndarray::Axis;
use tempfile::TempDir;
use tripcast::dataset::{load_csv, DatasetPreparer};
use tripcast::features::{extract, FeatureSchema, RawObservation};
use tripcast::preprocessing::{NormalizerState, ScalerType};
use tripcast::training::TrainingConfig;
use tripcast::TripcastError;

#[test]
fn test_load_csv_both_schemas() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("train.csv");
    let rows = common::synthetic_rows(40);
    common::write_csv(&path, &rows);

    let pickup_only = load_csv(&path, FeatureSchema::PickupOnly, "trip_duration").unwrap();
    assert_eq!(pickup_only.len(), 40);
    assert_eq!(pickup_only[3].pickup_datetime, rows[3].pickup_datetime);
    assert!((pickup_only[3].trip_duration.unwrap() - rows[3].trip_duration.unwrap()).abs() < 1e-9);

    let full = load_csv(&path, FeatureSchema::PickupDropoff, "trip_duration").unwrap();
    assert_eq!(full[5].passenger_count, rows[5].passenger_count);
    assert!(extract(FeatureSchema::PickupDropoff, &full[5]).is_ok());
}

#[test]
fn test_missing_columns_are_named() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.csv");
    std::fs::write(
        &path,
        "pickup_datetime,pickup_longitude,pickup_latitude\n2016-03-14 17:24:55,-73.98,40.76\n",
    )
    .unwrap();

    let err = load_csv(&path, FeatureSchema::PickupOnly, "trip_duration").unwrap_err();
    let msg = err.to_string();
    assert!(matches!(err, TripcastError::Data(_)));
    for column in ["dropoff_longitude", "dropoff_latitude", "trip_duration"] {
        assert!(msg.contains(column), "{} not reported in {}", column, msg);
    }
}

#[test]
fn test_missing_file() {
    let err = load_csv("/definitely/not/here.csv", FeatureSchema::PickupOnly, "trip_duration");
    assert!(matches!(err, Err(TripcastError::Data(_))));
}

#[test]
fn test_split_is_deterministic_and_disjoint() {
    let rows = common::synthetic_rows(100);
    let preparer = DatasetPreparer::from_config(&TrainingConfig::default());

    let a = preparer.prepare(&rows).unwrap();
    let b = preparer.prepare(&rows).unwrap();
    assert_eq!(a.train_rows, b.train_rows);
    assert_eq!(a.test_rows, b.test_rows);
    assert_eq!(a.x_train, b.x_train);

    assert_eq!(a.train_rows.len() + a.test_rows.len(), a.report.rows_retained);
    assert!(a.test_rows.iter().all(|r| !a.train_rows.contains(r)));
    assert_eq!(a.report.test_rows, 20);

    let other_seed = preparer.clone().with_random_state(7).prepare(&rows).unwrap();
    assert_ne!(a.test_rows, other_seed.test_rows);
}

#[test]
fn test_outlier_boundary() {
    let trip = |duration: f64| {
        RawObservation::new("2016-03-14 17:24:55", (40.76, -73.98), (40.77, -73.96))
            .with_trip_duration(duration)
    };
    let mut rows: Vec<RawObservation> = (1..=8).map(|i| trip(i as f64 * 100.0)).collect();
    rows.push(trip(36000.0));
    rows.push(trip(36001.0));
    rows.push(trip(0.0));
    rows.push(trip(-5.0));

    let data = DatasetPreparer::new(FeatureSchema::PickupOnly).prepare(&rows).unwrap();
    assert_eq!(data.report.rows_loaded, 12);
    assert_eq!(data.report.rows_out_of_range, 3);
    assert_eq!(data.report.rows_retained, 9);

    let all_targets: Vec<f64> = data.y_train.iter().chain(data.y_test.iter()).copied().collect();
    assert!(all_targets.contains(&36000.0));
    assert!(!all_targets.contains(&36001.0));
}

#[test]
fn test_everything_filtered_is_a_data_error() {
    let rows = vec![
        RawObservation::new("2016-03-14 17:24:55", (40.76, -73.98), (40.77, -73.96)).with_trip_duration(90000.0),
        RawObservation::new("garbage", (40.76, -73.98), (40.77, -73.96)).with_trip_duration(600.0),
    ];
    let err = DatasetPreparer::new(FeatureSchema::PickupOnly).prepare(&rows).unwrap_err();
    assert!(matches!(err, TripcastError::Data(_)));
}

#[test]
fn test_normalizer_reproduces_standardization() {
    let data = common::prepared(100);
    let normalizer =
        NormalizerState::fit(ScalerType::Standard, &data.feature_names, &data.x_train).unwrap();

    let mean = data.x_train.mean_axis(Axis(0)).unwrap();
    let std = data.x_train.std_axis(Axis(0), 0.0);
    let scaled = normalizer.transform(&data.feature_names, &data.x_test).unwrap();

    for (i, row) in data.x_test.outer_iter().enumerate() {
        for j in 0..row.len() {
            let expected = if std[j] > 0.0 {
                (row[j] - mean[j]) / std[j]
            } else {
                row[j] - mean[j]
            };
            assert!((scaled[[i, j]] - expected).abs() < 1e-9);
        }
    }

    // Record-at-a-time application agrees with the matrix path
    let row = data.x_test.row(0).to_vec();
    let record = tripcast::features::FeatureRecord::new(data.schema, row).unwrap();
    let applied = normalizer.apply(&record).unwrap();
    for (j, v) in applied.values().iter().enumerate() {
        assert!((v - scaled[[0, j]]).abs() < 1e-12);
    }
}

#[test]
fn test_normalizer_rejects_other_schema() {
    let data = common::prepared(40);
    let normalizer =
        NormalizerState::fit(ScalerType::Standard, &data.feature_names, &data.x_train).unwrap();

    let obs = common::synthetic_rows(1).remove(0);
    let record = extract(FeatureSchema::PickupDropoff, &obs).unwrap();
    assert!(matches!(
        normalizer.apply(&record),
        Err(TripcastError::SchemaMismatch { .. })
    ));
}
