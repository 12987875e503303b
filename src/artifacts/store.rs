//! Directory-backed artifact store with atomic run publication
//!
//! ```text
//! <root>/
//!   CURRENT                      name of the live run
//!   runs/<run_id>/manifest.json
//!   runs/<run_id>/normalizer.json
//!   runs/<run_id>/results.json
//!   runs/<run_id>/models/<name>.json
//!   staging/<run_id>/            runs being written
//! ```
//!
//! A run is written completely under `staging/`, renamed into `runs/`, and
//! only then named by `CURRENT`. Readers resolve `CURRENT` once per snapshot,
//! so they see either the old run or the new one in full.

use super::manifest::RunManifest;
use crate::error::{Result, TripcastError};
use crate::training::TrainingRun;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const CURRENT_FILE: &str = "CURRENT";
const RUNS_DIR: &str = "runs";
const STAGING_DIR: &str = "staging";

/// Stable key of one artifact within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    Model(String),
    Normalizer,
    Metrics,
    Manifest,
}

impl ArtifactKey {
    pub fn model(name: impl Into<String>) -> Self {
        ArtifactKey::Model(name.into())
    }

    /// Path relative to the run directory
    pub fn relative_path(&self) -> PathBuf {
        match self {
            ArtifactKey::Model(name) => Path::new("models").join(format!("{}.json", name)),
            ArtifactKey::Normalizer => PathBuf::from("normalizer.json"),
            ArtifactKey::Metrics => PathBuf::from("results.json"),
            ArtifactKey::Manifest => PathBuf::from("manifest.json"),
        }
    }

    fn check(&self) -> Result<()> {
        if let ArtifactKey::Model(name) = self {
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(TripcastError::InvalidParameter {
                    name: "model".to_string(),
                    value: name.clone(),
                    reason: "model keys are limited to [A-Za-z0-9_-]".to_string(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactKey::Model(name) => write!(f, "model:{}", name),
            ArtifactKey::Normalizer => write!(f, "normalizer"),
            ArtifactKey::Metrics => write!(f, "metrics"),
            ArtifactKey::Manifest => write!(f, "manifest"),
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path, what: impl fmt::Display) -> Result<T> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(TripcastError::NotFound(what.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_reader(BufReader::new(file)).map_err(|e| {
        TripcastError::Serialization(format!("failed to read {}: {}", path.display(), e))
    })
}

/// Root of all persisted runs
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open a store, creating the directory layout if needed
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(RUNS_DIR))?;
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(RUNS_DIR).join(run_id)
    }

    /// Start writing a new run under a fresh id
    pub fn begin_run(&self) -> Result<RunWriter> {
        let now = Utc::now();
        let run_id = format!(
            "{}-{}",
            now.format("%Y%m%dT%H%M%S%9fZ"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        let staging = self.root.join(STAGING_DIR).join(&run_id);
        fs::create_dir_all(&staging)?;
        debug!(run_id = %run_id, "Staging run");
        Ok(RunWriter {
            store: self.clone(),
            run_id,
            created_at: now,
            staging,
        })
    }

    /// Persist every artifact of a training run and make it the live run
    pub fn publish(&self, run: &TrainingRun) -> Result<String> {
        let writer = self.begin_run()?;
        for artifact in &run.artifacts {
            writer.save(&ArtifactKey::model(artifact.name.clone()), artifact)?;
        }
        writer.save(&ArtifactKey::Normalizer, &run.normalizer)?;
        writer.save(&ArtifactKey::Metrics, &run.metrics)?;
        let manifest = RunManifest::from_run(writer.run_id(), writer.created_at, run);
        writer.save(&ArtifactKey::Manifest, &manifest)?;
        writer.publish()
    }

    /// Id of the live run
    pub fn current_run(&self) -> Result<String> {
        let path = self.root.join(CURRENT_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(TripcastError::NotFound(format!(
                    "no published run in {}",
                    self.root.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let run_id = contents.trim();
        if run_id.is_empty() {
            return Err(TripcastError::NotFound(format!(
                "no published run in {}",
                self.root.display()
            )));
        }
        Ok(run_id.to_string())
    }

    /// Pin the live run so several keys can be read consistently
    pub fn load_snapshot(&self) -> Result<RunSnapshot> {
        let run_id = self.current_run()?;
        let dir = self.run_dir(&run_id);
        if !dir.is_dir() {
            return Err(TripcastError::NotFound(format!("run '{}' is missing", run_id)));
        }
        Ok(RunSnapshot { run_id, dir })
    }

    /// Read one key from the live run
    pub fn load<T: DeserializeOwned>(&self, key: &ArtifactKey) -> Result<T> {
        self.load_snapshot()?.load(key)
    }

    /// Published run ids, oldest first
    pub fn runs(&self) -> Result<Vec<String>> {
        let mut runs = Vec::new();
        for entry in fs::read_dir(self.root.join(RUNS_DIR))? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    runs.push(name.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }

    /// Keep at most `keep` runs (at least the live one) and delete the
    /// oldest of the rest.
    pub fn prune(&self, keep: usize) -> Result<Vec<String>> {
        let current = self.current_run().ok();
        let runs = self.runs()?;
        let others: Vec<&String> = runs
            .iter()
            .filter(|r| current.as_deref() != Some(r.as_str()))
            .collect();
        let budget = if current.is_some() {
            keep.saturating_sub(1)
        } else {
            keep
        };
        let cutoff = others.len().saturating_sub(budget);

        let mut removed = Vec::new();
        for run_id in &others[..cutoff] {
            fs::remove_dir_all(self.run_dir(run_id))?;
            removed.push((*run_id).clone());
        }
        if !removed.is_empty() {
            info!(removed = removed.len(), kept = runs.len() - removed.len(), "Pruned old runs");
        }
        let swept = self.sweep_staging()?;
        if swept > 0 {
            info!(swept, "Removed abandoned staging runs");
        }
        Ok(removed)
    }

    /// Delete runs left in `staging/` by writers that never published.
    ///
    /// Assumes a single writer: a run another process is still staging is
    /// removed too.
    fn sweep_staging(&self) -> Result<usize> {
        let mut swept = 0;
        for entry in fs::read_dir(self.root.join(STAGING_DIR))? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else {
                fs::remove_file(&path)?;
            }
            swept += 1;
        }
        Ok(swept)
    }
}

/// Writes one run's artifacts into the staging area.
///
/// Dropping a writer without publishing removes what it staged.
#[derive(Debug)]
pub struct RunWriter {
    store: ArtifactStore,
    run_id: String,
    created_at: chrono::DateTime<Utc>,
    staging: PathBuf,
}

impl RunWriter {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn save<T: Serialize + ?Sized>(&self, key: &ArtifactKey, value: &T) -> Result<()> {
        key.check()?;
        write_json(&self.staging.join(key.relative_path()), value)?;
        debug!(run_id = %self.run_id, key = %key, "Saved artifact");
        Ok(())
    }

    /// Move the staged run into place, then repoint `CURRENT` at it
    pub fn publish(self) -> Result<String> {
        let target = self.store.run_dir(&self.run_id);
        fs::rename(&self.staging, &target)?;

        let tmp = self
            .store
            .root
            .join(format!("{}.{}.tmp", CURRENT_FILE, Uuid::new_v4().simple()));
        {
            let mut file = File::create(&tmp)?;
            file.write_all(self.run_id.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp, self.store.root.join(CURRENT_FILE))?;

        info!(run_id = %self.run_id, path = %target.display(), "Published run");
        Ok(self.run_id.clone())
    }

    /// Drop everything staged so far
    pub fn discard(self) -> Result<()> {
        fs::remove_dir_all(&self.staging)?;
        Ok(())
    }
}

impl Drop for RunWriter {
    fn drop(&mut self) {
        if !self.staging.exists() {
            return;
        }
        match fs::remove_dir_all(&self.staging) {
            Ok(()) => debug!(run_id = %self.run_id, "Discarded unpublished run"),
            Err(e) => warn!(run_id = %self.run_id, error = %e, "Failed to remove staged run"),
        }
    }
}

/// A fixed run directory resolved from `CURRENT` at one point in time
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    run_id: String,
    dir: PathBuf,
}

impl RunSnapshot {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn load<T: DeserializeOwned>(&self, key: &ArtifactKey) -> Result<T> {
        key.check()?;
        read_json(
            &self.dir.join(key.relative_path()),
            format_args!("artifact {} in run '{}'", key, self.run_id),
        )
    }

    pub fn manifest(&self) -> Result<RunManifest> {
        self.load(&ArtifactKey::Manifest)
    }
}
