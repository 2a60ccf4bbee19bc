use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use s3unzip::cli::{Cli, Commands};
use s3unzip::config::AppConfig;
use s3unzip::handler::{self, S3Event};
use s3unzip::s3::{S3Client, StoreMetrics};
use s3unzip::{Pipeline, PipelineError};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // --- Logging setup ---
    let default_filter = if cli.is_verbose() { "s3unzip=info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(message) => println!("{}", message.green()),
        Err(e) => {
            // Pipeline errors already carry their cause in the message
            let message = if e.downcast_ref::<PipelineError>().is_some() {
                format!("{e}")
            } else {
                format!("{e:#}")
            };
            eprintln!("{}", message.red().bold());
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<&'static str> {
    let verbose = cli.is_verbose();
    let config = AppConfig::from_env(cli.overrides()).context("Error: invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");

    let metrics = StoreMetrics::new();
    let client = S3Client::from_config(&config.store)
        .await
        .with_metrics(Arc::clone(&metrics));
    tracing::debug!(region = client.region(), "S3 client ready");

    let pipeline = Pipeline::new(Arc::new(client), config.pipeline);

    let result = match cli.command {
        Commands::Event { path } => {
            let payload = read_payload(path)?;
            let event = S3Event::from_json(&payload).context("Error: malformed S3 notification")?;
            handler::handle_event(&pipeline, event).await
        }
        unzip => {
            let command = unzip
                .direct_command()
                .context("Error: unzip arguments missing")?;
            handler::unzip(&pipeline, command).await
        }
    };

    if verbose {
        tracing::info!(
            requests = metrics.request_count(),
            summary = %metrics.summary(),
            "transfer summary"
        );
    }

    Ok(result?)
}

/// Read the notification from a file, or stdin for `-`/no path
fn read_payload(path: Option<PathBuf>) -> Result<String> {
    match path {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .with_context(|| format!("Error: cannot read notification {}", path.display())),
        _ => {
            let mut payload = String::new();
            std::io::stdin()
                .read_to_string(&mut payload)
                .context("Error: cannot read notification from stdin")?;
            Ok(payload)
        }
    }
}
