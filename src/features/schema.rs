//! Versioned feature contracts shared by training and serving

use crate::error::{Result, TripcastError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const PICKUP_ONLY_FIELDS: [&str; 7] = [
    "pickup_hour",
    "pickup_dayofweek",
    "pickup_month",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
];

const PICKUP_DROPOFF_FIELDS: [&str; 11] = [
    "pickup_hour",
    "pickup_dayofweek",
    "pickup_month",
    "dropoff_hour",
    "dropoff_dayofweek",
    "dropoff_month",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
    "passenger_count",
];

/// The field set and order a model and its normalizer were fitted against.
///
/// Persisted with every artifact set so the serving side builds records with
/// the same contract the models were trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSchema {
    /// Calendar features from the pickup timestamp plus both coordinate pairs
    PickupOnly,
    /// Calendar features from pickup and dropoff timestamps, both coordinate
    /// pairs and the passenger count
    PickupDropoff,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self::PickupOnly
    }
}

impl FeatureSchema {
    /// Ordered feature names
    pub fn feature_names(&self) -> &'static [&'static str] {
        match self {
            FeatureSchema::PickupOnly => &PICKUP_ONLY_FIELDS,
            FeatureSchema::PickupDropoff => &PICKUP_DROPOFF_FIELDS,
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_names().len()
    }

    /// Stable identifier used in manifests and on the command line
    pub fn name(&self) -> &'static str {
        match self {
            FeatureSchema::PickupOnly => "pickup_only",
            FeatureSchema::PickupDropoff => "pickup_dropoff",
        }
    }

    /// Whether records built under this schema need the dropoff timestamp
    /// and the passenger count.
    pub fn requires_dropoff(&self) -> bool {
        matches!(self, FeatureSchema::PickupDropoff)
    }

    /// Owned copy of the field names, for persisted state
    pub fn feature_names_owned(&self) -> Vec<String> {
        self.feature_names().iter().map(|s| s.to_string()).collect()
    }

    /// Check that `names` is exactly this schema's field list, in order.
    pub fn check_names(&self, names: &[String]) -> Result<()> {
        let expected = self.feature_names();
        let matches = names.len() == expected.len()
            && names.iter().zip(expected.iter()).all(|(a, b)| a == b);
        if matches {
            Ok(())
        } else {
            Err(TripcastError::SchemaMismatch {
                expected: format!("{} {:?}", self.name(), expected),
                actual: format!("{:?}", names),
            })
        }
    }
}

impl fmt::Display for FeatureSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureSchema {
    type Err = TripcastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pickup_only" | "pickup" | "7" => Ok(FeatureSchema::PickupOnly),
            "pickup_dropoff" | "full" | "11" => Ok(FeatureSchema::PickupDropoff),
            other => Err(TripcastError::Config(format!(
                "Unknown feature schema '{}', expected pickup_only or pickup_dropoff",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_counts() {
        assert_eq!(FeatureSchema::PickupOnly.n_features(), 7);
        assert_eq!(FeatureSchema::PickupDropoff.n_features(), 11);
    }

    #[test]
    fn test_parse_roundtrip_names() {
        for schema in [FeatureSchema::PickupOnly, FeatureSchema::PickupDropoff] {
            assert_eq!(schema.name().parse::<FeatureSchema>().unwrap(), schema);
        }
        assert!("twelve".parse::<FeatureSchema>().is_err());
    }

    #[test]
    fn test_serde_uses_stable_name() {
        let json = serde_json::to_string(&FeatureSchema::PickupDropoff).unwrap();
        assert_eq!(json, "\"pickup_dropoff\"");
    }

    #[test]
    fn test_check_names_rejects_reordering() {
        let schema = FeatureSchema::PickupOnly;
        assert!(schema.check_names(&schema.feature_names_owned()).is_ok());

        let mut swapped = schema.feature_names_owned();
        swapped.swap(0, 1);
        assert!(matches!(
            schema.check_names(&swapped),
            Err(TripcastError::SchemaMismatch { .. })
        ));
    }
}
