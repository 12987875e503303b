//! Artifact persistence
//!
//! Every training run is written to its own directory and published by
//! swapping a single pointer file, so serving never observes a partial set.

mod manifest;
mod store;

pub use manifest::{ManifestEntry, RunManifest};
pub use store::{ArtifactKey, ArtifactStore, RunSnapshot, RunWriter};
