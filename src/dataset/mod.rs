//! Dataset loading and preparation
//!
//! Reads the trip CSV, drops rows whose target is out of range or whose
//! features cannot be extracted, and splits the rest with a seeded shuffle.

mod loader;
mod preparer;

pub use loader::{load_csv, observations_from_frame, REQUIRED_COLUMNS};
pub use preparer::{DatasetPreparer, PreparationReport, PreparedDataset};
