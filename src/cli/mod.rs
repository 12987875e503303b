//! tripcast CLI Module
//!
//! Command-line interface for training the model registry, querying the
//! published artifacts and serving predictions.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::artifacts::{ArtifactKey, ArtifactStore};
use crate::dataset::{load_csv, DatasetPreparer};
use crate::features::{FeatureSchema, RawObservation};
use crate::inference::PredictionService;
use crate::preprocessing::ScalerType;
use crate::server::{run_server, ServerConfig};
use crate::training::{format_elapsed, MetricsReport, ModelRegistry, TrainEngine, TrainingConfig};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

/// `612.4` -> `10m 12s`
fn human_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    format!("{}m {:02}s", total / 60, total % 60)
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "tripcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Trip duration models: train, publish, predict and serve")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Train every registry model on a CSV and publish the artifacts
    Train(TrainArgs),

    /// Predict one trip with every model of the published run
    Predict(PredictArgs),

    /// Print the metrics report of the published run
    Results {
        /// Artifact store directory
        #[arg(short, long, default_value = "./models")]
        artifacts: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Start the prediction server
    Serve {
        /// Server port
        #[arg(short, long)]
        port: Option<u16>,

        /// Server host
        #[arg(long)]
        host: Option<String>,

        /// Artifact store directory
        #[arg(short, long)]
        artifacts: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Input CSV file
    #[arg(short, long)]
    pub data: PathBuf,

    /// Feature schema (pickup_only, pickup_dropoff)
    #[arg(long)]
    pub schema: Option<FeatureSchema>,

    /// Target column name
    #[arg(short, long)]
    pub target: Option<String>,

    /// Rows with a target above this many seconds are dropped
    #[arg(long)]
    pub max_target: Option<f64>,

    /// Fraction of rows held out for evaluation
    #[arg(long)]
    pub test_size: Option<f64>,

    /// Seed for the train/test split
    #[arg(long)]
    pub seed: Option<u64>,

    /// Scaler for standardized-mode models (standard, minmax)
    #[arg(long)]
    pub scaler: Option<ScalerType>,

    /// Artifact store directory
    #[arg(short, long, default_value = "./models")]
    pub artifacts: PathBuf,

    /// Fit models one after another
    #[arg(long)]
    pub sequential: bool,

    /// Worker threads for concurrent fitting
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// JSON training config; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON model registry replacing the default six models
    #[arg(long)]
    pub registry: Option<PathBuf>,

    /// Published runs to keep after this one
    #[arg(long, default_value = "3")]
    pub keep_runs: usize,
}

impl TrainArgs {
    /// Config file (or defaults) with command-line overrides applied
    pub fn training_config(&self) -> crate::error::Result<TrainingConfig> {
        let mut config = match &self.config {
            Some(path) => TrainingConfig::load(path)?,
            None => TrainingConfig::default(),
        };
        if let Some(schema) = self.schema {
            config.schema = schema;
        }
        if let Some(target) = &self.target {
            config = config.with_target(target.clone());
        }
        if let Some(bound) = self.max_target {
            config = config.with_max_target(bound);
        }
        if let Some(test_size) = self.test_size {
            config = config.with_test_size(test_size);
        }
        if let Some(seed) = self.seed {
            config = config.with_random_state(seed);
        }
        if let Some(scaler) = self.scaler {
            config = config.with_scaler(scaler);
        }
        if self.sequential {
            config = config.with_parallel(false);
        }
        if let Some(jobs) = self.jobs {
            config = config.with_n_jobs(jobs);
        }
        config.validate()?;
        Ok(config)
    }

    fn model_registry(&self) -> anyhow::Result<ModelRegistry> {
        let registry = match &self.registry {
            Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
            None => ModelRegistry::default(),
        };
        Ok(registry)
    }
}

#[derive(Args, Debug, Clone)]
pub struct PredictArgs {
    /// Artifact store directory
    #[arg(short, long, default_value = "./models")]
    pub artifacts: PathBuf,

    /// Pickup time, e.g. 2023-06-15T08:30:00Z
    #[arg(long)]
    pub pickup_datetime: String,

    #[arg(long, allow_negative_numbers = true)]
    pub pickup_latitude: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub pickup_longitude: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub dropoff_latitude: f64,

    #[arg(long, allow_negative_numbers = true)]
    pub dropoff_longitude: f64,

    /// Required by the pickup_dropoff schema
    #[arg(long)]
    pub dropoff_datetime: Option<String>,

    /// Required by the pickup_dropoff schema
    #[arg(long)]
    pub passenger_count: Option<f64>,

    /// Print predictions as JSON
    #[arg(long)]
    pub json: bool,
}

impl PredictArgs {
    pub fn observation(&self) -> RawObservation {
        let mut obs = RawObservation::new(
            self.pickup_datetime.clone(),
            (self.pickup_latitude, self.pickup_longitude),
            (self.dropoff_latitude, self.dropoff_longitude),
        );
        if let Some(dropoff) = &self.dropoff_datetime {
            obs = obs.with_dropoff_datetime(dropoff.clone());
        }
        if let Some(count) = self.passenger_count {
            obs = obs.with_passenger_count(count);
        }
        obs
    }
}

// ─── Commands ──────────────────────────────────────────────────────────────────

/// Train with ctrl+c wired to the engine's abort flag
pub async fn cmd_train(args: TrainArgs) -> anyhow::Result<()> {
    let abort = Arc::new(AtomicBool::new(false));
    let watcher = {
        let abort = Arc::clone(&abort);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, stopping before the next model");
                abort.store(true, Ordering::SeqCst);
            }
        })
    };

    let result = tokio::task::spawn_blocking(move || train(&args, abort)).await;
    watcher.abort();
    result?
}

/// Load, prepare, train, evaluate and publish
pub fn train(args: &TrainArgs, abort: Arc<AtomicBool>) -> anyhow::Result<()> {
    let total = Instant::now();
    let config = args.training_config()?;
    let registry = args.model_registry()?;
    registry.validate()?;

    section("Train");
    println!("  {}", kv("schema", &config.schema.to_string()));
    println!("  {}", kv("target", &format!("{} (≤ {})", config.target_column, config.max_target)));
    println!("  {}", kv("models", &registry.names().join(", ")));
    println!();

    step_run("Loading data");
    let start = Instant::now();
    let rows = load_csv(&args.data, config.schema, &config.target_column)?;
    step_done(&format!("{} rows in {:.2?}", rows.len(), start.elapsed()));

    step_run("Preparing dataset");
    let data = DatasetPreparer::from_config(&config).prepare(&rows)?;
    let report = &data.report;
    step_done(&format!(
        "{} kept ({} out of range, {} invalid), {} train / {} test",
        report.rows_retained, report.rows_out_of_range, report.rows_invalid, report.train_rows, report.test_rows
    ));

    step_run(&format!("Training {} models", registry.len()));
    let engine = TrainEngine::new(config).with_abort_flag(abort);
    let run = engine.run(&data, &registry)?;
    step_done(&format!("{:.2?}", run.elapsed));

    println!();
    println!(
        "  {:<20} {:>14} {:>9} {:>9}  {}",
        muted("Model"), muted("MSE"), muted("R²"), muted("Time"), muted("Input")
    );
    println!("  {}", dim(&"─".repeat(64)));
    for artifact in &run.artifacts {
        if let Some(score) = run.metrics.get(&artifact.name) {
            let secs = run.timings.get(&artifact.name).map(|d| d.as_secs_f64()).unwrap_or_default();
            println!(
                "  {:<20} {:>14.2} {:>9.4} {:>8.2}s  {}",
                artifact.name, score.mean_squared_error, score.r2_score, secs, dim(&artifact.input_mode.to_string())
            );
        }
    }
    for failure in &run.failures {
        println!("  {:<20} {}", failure.model, format!("failed: {}", failure.reason).red());
    }
    println!("  {}", dim(&"─".repeat(64)));

    let best = run
        .metrics
        .iter()
        .max_by(|a, b| a.1.r2_score.total_cmp(&b.1.r2_score));
    if let Some((name, score)) = best {
        println!("  {} {} {} {:.4}", ok("best"), name.white().bold(), muted("R²:"), score.r2_score);
    }
    println!();

    step_run(&format!("Publishing → {}", args.artifacts.display()));
    let store = ArtifactStore::open(&args.artifacts)?;
    let run_id = store.publish(&run)?;
    step_done(&run_id);
    let pruned = store.prune(args.keep_runs)?;
    if !pruned.is_empty() {
        step_ok(&format!("Removed {} old run(s)", pruned.len()));
    }

    println!();
    println!(
        "  {}",
        format!(
            "Training and saving completed successfully in {}!",
            format_elapsed(total.elapsed())
        )
        .green()
    );
    println!();
    Ok(())
}

pub fn cmd_predict(args: &PredictArgs) -> anyhow::Result<()> {
    let service = PredictionService::open(ArtifactStore::open(&args.artifacts)?)?;
    let predictions = service.predict(&args.observation())?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&predictions)?);
        return Ok(());
    }

    let set = service.snapshot();
    section("Predict");
    println!("  {}", kv("run", set.run_id()));
    println!("  {}", kv("schema", &set.schema().to_string()));
    println!();
    for (name, seconds) in &predictions {
        println!("  {:<20} {:>10.1}s  {}", name, seconds, dim(&human_duration(*seconds)));
    }
    println!();
    Ok(())
}

pub fn cmd_results(artifacts: &Path, json: bool) -> anyhow::Result<()> {
    let store = ArtifactStore::open(artifacts)?;
    let run_id = store.current_run()?;
    let report: MetricsReport = store.load(&ArtifactKey::Metrics)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    section("Results");
    println!("  {}", kv("run", &run_id));
    println!();
    println!("  {:<20} {:>14} {:>9}", muted("Model"), muted("MSE"), muted("R²"));
    println!("  {}", dim(&"─".repeat(46)));
    for (name, score) in report.iter() {
        println!("  {:<20} {:>14.2} {:>9.4}", name, score.mean_squared_error, score.r2_score);
    }
    println!();
    Ok(())
}

pub async fn cmd_serve(
    host: Option<String>,
    port: Option<u16>,
    artifacts: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = ServerConfig::default();
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(dir) = artifacts {
        config.artifacts_dir = dir;
    }
    run_server(config).await
}
