//! Feature extraction
//!
//! Turns raw trip observations into fixed-schema numeric records. The
//! [`FeatureSchema`] chosen at training time travels with the artifacts and
//! must be the one used again at inference.

mod extractor;
mod observation;
mod schema;

pub use extractor::{extract, parse_timestamp, FeatureRecord};
pub use observation::RawObservation;
pub use schema::FeatureSchema;
