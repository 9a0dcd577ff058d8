use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ncbridge::{Executor, ItemParameters, NextcloudConfig, Operation, Record};

/// Run Nextcloud file, folder and user operations as batch jobs.
///
/// Credentials come from the environment: NEXTCLOUD_WEBDAV_URL,
/// NEXTCLOUD_USERNAME and NEXTCLOUD_PASSWORD (a .env file is honored).
#[derive(Parser)]
#[command(name = "ncbridge", version)]
struct Args {
    /// JSON job file describing the operation, input items and parameters
    job: PathBuf,

    /// Emit error records instead of aborting on the first failure
    #[arg(long)]
    continue_on_fail: bool,

    /// Pretty-print the output records
    #[arg(long)]
    pretty: bool,
}

#[derive(Deserialize)]
struct JobFile {
    #[serde(flatten)]
    operation: Operation,
    #[serde(default)]
    items: Vec<Record>,
    #[serde(default)]
    parameters: ItemParameters,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let raw = fs::read_to_string(&args.job)
        .with_context(|| format!("cannot read job file {}", args.job.display()))?;
    let job: JobFile = serde_json::from_str(&raw)
        .with_context(|| format!("invalid job file {}", args.job.display()))?;

    let config = NextcloudConfig::from_env()?;

    // A job without explicit items still runs once
    let items = if job.items.is_empty() {
        vec![Record::default()]
    } else {
        job.items
    };

    info!(operation = %job.operation, records = items.len(), "running job");

    let executor = Executor::new(config)?.continue_on_fail(args.continue_on_fail);
    let output = executor
        .execute(&job.operation, &items, &job.parameters)
        .await?;

    let rendered = if args.pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    };
    println!("{rendered}");

    Ok(())
}
