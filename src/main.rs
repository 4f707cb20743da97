//! drift: SQS-driven NDJSON repartitioner for DDFS.

use clap::Parser;
use snafu::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info};

use drift::config::Config;
use drift::error::{AddressParseSnafu, ConfigSnafu, MetricsSnafu, WorkerError};
use drift::{init_tracing, metrics, run_worker};

/// Repartition S3 blobs named by SQS notifications into DDFS chunks.
#[derive(Parser, Debug)]
#[command(name = "drift")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. Defaults to `processor.yaml` if present.
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Dry run - validate and print the configuration, then exit.
    #[arg(long)]
    dry_run: bool,
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), WorkerError> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!("drift starting");

    let config = Config::load(args.config.as_deref()).context(ConfigSnafu)?;

    if config.print_config || args.dry_run {
        info!("Resolved configuration:\n{}", config.render().context(ConfigSnafu)?);
    }

    if args.dry_run {
        let arn = config.queue_arn().context(ConfigSnafu)?;
        info!(queue = %arn.name, region = %arn.region, "Configuration is valid");
        return Ok(());
    }

    if config.metrics.enabled {
        let addr = config.metrics.address.parse().context(AddressParseSnafu)?;
        let bound = metrics::init(addr).await.context(MetricsSnafu)?;
        debug!(%bound, "Metrics recorder installed");
    }

    let stats = run_worker(config).await?;

    info!("drift stopped");
    info!("  Messages processed: {}", stats.processed);
    info!("  Failed to get body: {}", stats.failed_get_body);
    info!("  Invalid bodies: {}", stats.invalid_body);
    info!("  Failed to process: {}", stats.failed_to_process);
    info!("  Poll failures: {}", stats.poll_failures);

    Ok(())
}
