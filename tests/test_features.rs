//! Integration tests for feature extraction

use serde_json::json;
use tripcast::features::{extract, parse_timestamp, FeatureSchema, RawObservation};
use tripcast::TripcastError;

fn documented_trip() -> RawObservation {
    RawObservation::new("2023-06-15T08:30:00Z", (40.7128, -74.0060), (40.7580, -73.9855))
}

#[test]
fn test_pickup_only_record() {
    let record = extract(FeatureSchema::PickupOnly, &documented_trip()).unwrap();

    assert_eq!(
        record.names(),
        &[
            "pickup_hour",
            "pickup_dayofweek",
            "pickup_month",
            "pickup_longitude",
            "pickup_latitude",
            "dropoff_longitude",
            "dropoff_latitude",
        ]
    );
    // 2023-06-15 is a Thursday
    assert_eq!(record.get("pickup_hour"), Some(8.0));
    assert_eq!(record.get("pickup_dayofweek"), Some(3.0));
    assert_eq!(record.get("pickup_month"), Some(6.0));
    assert_eq!(record.get("pickup_longitude"), Some(-74.0060));
    assert_eq!(record.get("dropoff_latitude"), Some(40.7580));
    assert_eq!(record.get("passenger_count"), None);
}

#[test]
fn test_extraction_is_deterministic() {
    let obs = documented_trip();
    let first = extract(FeatureSchema::PickupOnly, &obs).unwrap();
    for _ in 0..10 {
        assert_eq!(extract(FeatureSchema::PickupOnly, &obs).unwrap(), first);
    }
}

#[test]
fn test_pickup_dropoff_record() {
    let obs = documented_trip()
        .with_dropoff_datetime("2023-06-16 00:10:00")
        .with_passenger_count(2.0);
    let record = extract(FeatureSchema::PickupDropoff, &obs).unwrap();

    assert_eq!(record.values().len(), 11);
    assert_eq!(record.get("dropoff_hour"), Some(0.0));
    assert_eq!(record.get("dropoff_dayofweek"), Some(4.0));
    assert_eq!(record.get("passenger_count"), Some(2.0));
    let names: Vec<&str> = record.iter().map(|(n, _)| n).collect();
    assert_eq!(names, FeatureSchema::PickupDropoff.feature_names());
}

#[test]
fn test_pickup_dropoff_requires_extra_fields() {
    let err = extract(FeatureSchema::PickupDropoff, &documented_trip()).unwrap_err();
    assert!(matches!(err, TripcastError::Validation(_)));
    assert!(err.is_client_error());

    let no_passengers = documented_trip().with_dropoff_datetime("2023-06-15T09:00:00Z");
    let err = extract(FeatureSchema::PickupDropoff, &no_passengers).unwrap_err();
    assert!(err.to_string().contains("passenger_count"));
}

#[test]
fn test_malformed_timestamp() {
    let obs = RawObservation::new("not-a-date", (40.7128, -74.0060), (40.7580, -73.9855));
    let err = extract(FeatureSchema::PickupOnly, &obs).unwrap_err();
    assert!(matches!(err, TripcastError::Validation(_)));
    assert!(parse_timestamp("2023-13-01T00:00:00").is_err());
}

#[test]
fn test_non_finite_coordinate() {
    let obs = RawObservation::new("2023-06-15T08:30:00Z", (f64::NAN, -74.0), (40.75, -73.98));
    assert!(matches!(
        extract(FeatureSchema::PickupOnly, &obs),
        Err(TripcastError::Validation(_))
    ));
}

#[test]
fn test_bare_date_is_midnight() {
    let obs = RawObservation::new("2023-06-15", (40.7128, -74.0060), (40.7580, -73.9855));
    let record = extract(FeatureSchema::PickupOnly, &obs).unwrap();
    assert_eq!(record.get("pickup_hour"), Some(0.0));
}

#[test]
fn test_json_request_validation() {
    let missing = json!({
        "pickup_datetime": "2023-06-15T08:30:00Z",
        "pickup_latitude": 40.7128,
        "dropoff_latitude": 40.7580,
        "dropoff_longitude": -73.9855,
    });
    let err = RawObservation::from_json(&missing).unwrap_err();
    assert!(err.to_string().contains("pickup_longitude"));

    let non_numeric = json!({
        "pickup_datetime": "2023-06-15T08:30:00Z",
        "pickup_latitude": "north",
        "pickup_longitude": -74.0060,
        "dropoff_latitude": 40.7580,
        "dropoff_longitude": -73.9855,
    });
    assert!(matches!(
        RawObservation::from_json(&non_numeric),
        Err(TripcastError::Validation(_))
    ));

    assert!(RawObservation::from_json(&json!([1, 2, 3])).is_err());
}

#[test]
fn test_schema_names_parse() {
    assert_eq!("pickup_only".parse::<FeatureSchema>().unwrap(), FeatureSchema::PickupOnly);
    assert_eq!(
        "pickup_dropoff".parse::<FeatureSchema>().unwrap(),
        FeatureSchema::PickupDropoff
    );
    assert!("everything".parse::<FeatureSchema>().is_err());
    assert_eq!(FeatureSchema::PickupDropoff.n_features(), 11);
}
