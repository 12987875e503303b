//! Raw trip observations as they arrive from a dataset row or a request

use crate::error::{Result, TripcastError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single trip before feature extraction.
///
/// `trip_duration` is only present in training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub pickup_datetime: String,
    pub pickup_longitude: f64,
    pub pickup_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_latitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dropoff_datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passenger_count: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trip_duration: Option<f64>,
}

impl RawObservation {
    /// Observation with pickup/dropoff coordinates only
    pub fn new(
        pickup_datetime: impl Into<String>,
        pickup: (f64, f64),
        dropoff: (f64, f64),
    ) -> Self {
        Self {
            pickup_datetime: pickup_datetime.into(),
            pickup_latitude: pickup.0,
            pickup_longitude: pickup.1,
            dropoff_latitude: dropoff.0,
            dropoff_longitude: dropoff.1,
            dropoff_datetime: None,
            passenger_count: None,
            trip_duration: None,
        }
    }

    pub fn with_dropoff_datetime(mut self, dropoff_datetime: impl Into<String>) -> Self {
        self.dropoff_datetime = Some(dropoff_datetime.into());
        self
    }

    pub fn with_passenger_count(mut self, count: f64) -> Self {
        self.passenger_count = Some(count);
        self
    }

    pub fn with_trip_duration(mut self, duration: f64) -> Self {
        self.trip_duration = Some(duration);
        self
    }

    /// Build an observation from a loosely typed JSON request body.
    ///
    /// Coordinates may be JSON numbers or numeric strings; web forms post
    /// every field as a string.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            TripcastError::Validation("request body must be a JSON object".to_string())
        })?;

        Ok(Self {
            pickup_datetime: string_field(obj, "pickup_datetime")?
                .ok_or_else(|| missing("pickup_datetime"))?,
            pickup_longitude: number_field(obj, "pickup_longitude")?
                .ok_or_else(|| missing("pickup_longitude"))?,
            pickup_latitude: number_field(obj, "pickup_latitude")?
                .ok_or_else(|| missing("pickup_latitude"))?,
            dropoff_longitude: number_field(obj, "dropoff_longitude")?
                .ok_or_else(|| missing("dropoff_longitude"))?,
            dropoff_latitude: number_field(obj, "dropoff_latitude")?
                .ok_or_else(|| missing("dropoff_latitude"))?,
            dropoff_datetime: string_field(obj, "dropoff_datetime")?,
            passenger_count: number_field(obj, "passenger_count")?,
            trip_duration: None,
        })
    }
}

fn missing(field: &str) -> TripcastError {
    TripcastError::Validation(format!("missing required field '{}'", field))
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(TripcastError::Validation(format!(
            "'{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn number_field(obj: &Map<String, Value>, key: &str) -> Result<Option<f64>> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| {
            TripcastError::Validation(format!("'{}' is not representable as a float", key))
        }),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| {
            TripcastError::Validation(format!("'{}' must be numeric, got '{}'", key, s))
        }),
        Some(other) => Err(TripcastError::Validation(format!(
            "'{}' must be numeric, got {}",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_json_accepts_numeric_strings() {
        let body = json!({
            "pickup_datetime": "2023-06-15T08:30:00Z",
            "pickup_longitude": "-74.0060",
            "pickup_latitude": 40.7128,
            "dropoff_longitude": -73.9855,
            "dropoff_latitude": "40.7580",
        });
        let obs = RawObservation::from_json(&body).unwrap();
        assert_eq!(obs.pickup_longitude, -74.0060);
        assert_eq!(obs.dropoff_latitude, 40.7580);
        assert!(obs.dropoff_datetime.is_none());
        assert!(obs.passenger_count.is_none());
    }

    #[test]
    fn test_from_json_missing_field() {
        let body = json!({
            "pickup_datetime": "2023-06-15T08:30:00Z",
            "pickup_longitude": -74.0060,
            "pickup_latitude": 40.7128,
            "dropoff_longitude": -73.9855,
        });
        let err = RawObservation::from_json(&body).unwrap_err();
        assert!(err.to_string().contains("dropoff_latitude"));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_from_json_rejects_non_numeric() {
        let body = json!({
            "pickup_datetime": "2023-06-15T08:30:00Z",
            "pickup_longitude": "west",
            "pickup_latitude": 40.7128,
            "dropoff_longitude": -73.9855,
            "dropoff_latitude": 40.7580,
        });
        assert!(matches!(
            RawObservation::from_json(&body),
            Err(TripcastError::Validation(_))
        ));
        assert!(RawObservation::from_json(&json!([1, 2, 3])).is_err());
    }
}
