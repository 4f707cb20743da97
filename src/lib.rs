//! drift: an SQS-driven worker that repartitions NDJSON blobs by date and
//! publishes them to DDFS.
//!
//! Each queue message names an object in S3. The worker downloads it, splits
//! its lines into one file per `date`, pushes every file to DDFS as a tagged
//! chunk and only then deletes the message. Shutdown signals that arrive
//! while chunks are being pushed are deferred until the message is deleted.
//!
//! # Example
//!
//! ```ignore
//! use drift::{Config, run_worker};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), drift::error::WorkerError> {
//!     let config = Config::load(None).unwrap();
//!     let stats = run_worker(config).await?;
//!     println!("Processed {} messages", stats.processed);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod publish;
pub mod queue;
pub mod signal;
pub mod storage;

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// Re-export main types
pub use config::Config;
pub use pipeline::{Consumer, MessageProcessor, WorkerStats, run_worker};
pub use signal::CriticalSectionGuard;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(env_filter)
        .init();
}
