//! tripcast - Main Entry Point
//!
//! Trains the trip duration model registry, inspects published runs and
//! serves predictions over HTTP.

use clap::Parser;
use tripcast::cli::{cmd_predict, cmd_results, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripcast=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train(args) => {
            cmd_train(args).await?;
        }
        Commands::Predict(args) => {
            cmd_predict(&args)?;
        }
        Commands::Results { artifacts, json } => {
            cmd_results(&artifacts, json)?;
        }
        Commands::Serve { port, host, artifacts } => {
            cmd_serve(host, port, artifacts).await?;
        }
    }

    Ok(())
}
