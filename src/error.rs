//! Error types for drift using snafu.
//!
//! Each stage of message processing has its own error enum so the consumer
//! loop can decide per failure whether to count it and move on or to stop.

use snafu::prelude::*;
use std::path::PathBuf;

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// A required string option is empty.
    #[snafu(display("Config option '{option}' cannot be empty"))]
    EmptyOption { option: &'static str },

    /// Long-poll wait outside the range SQS accepts.
    #[snafu(display("wait_time_secs must be between 1 and 20, got {value}"))]
    InvalidWaitTime { value: u64 },

    /// Queue identifier is not an SQS ARN.
    #[snafu(display("invalid sqs arn: {arn}"))]
    InvalidArn { arn: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration: {source}"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to serialize the resolved configuration.
    #[snafu(display("Failed to render configuration: {source}"))]
    YamlRender { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file {}: {source}", path.display()))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============ Queue Errors ============

/// Errors raised by the queue client.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    /// The configured queue could not be resolved to a URL.
    #[snafu(display("could not connect to sqs queue: {arn}"))]
    Connect {
        arn: String,
        source: aws_sdk_sqs::Error,
    },

    /// The queue lookup succeeded but returned no URL.
    #[snafu(display("could not connect to sqs queue: {arn} (no queue url returned)"))]
    MissingQueueUrl { arn: String },

    /// Long-poll receive failed.
    #[snafu(display("Failed to receive from queue: {source}"))]
    Receive { source: aws_sdk_sqs::Error },

    /// Delete (acknowledge) failed.
    #[snafu(display("Failed to delete message {message_id}: {source}"))]
    Delete {
        message_id: String,
        source: aws_sdk_sqs::Error,
    },

    /// The message came without a body.
    #[snafu(display("Message {message_id} has no body"))]
    MissingBody { message_id: String },

    /// The message came without a receipt handle, so it cannot be deleted.
    #[snafu(display("Message {message_id} has no receipt handle"))]
    MissingReceipt { message_id: String },
}

// ============ Decode Errors ============

/// Errors decoding a queue body into a task.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DecodeError {
    /// Outer notification document is not valid JSON or lacks `Message`.
    #[snafu(display("Invalid notification envelope: {source}"))]
    Envelope { source: serde_json::Error },

    /// Inner task document could not be parsed.
    #[snafu(display("Invalid task payload: {source}"))]
    TaskPayload { source: serde_json::Error },

    /// A task field is present but empty.
    #[snafu(display("Task field '{field}' cannot be empty"))]
    EmptyField { field: &'static str },
}

// ============ Fetch Errors ============

/// Errors fetching a blob from object storage.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum FetchError {
    /// The object does not exist.
    #[snafu(display("Error: key not found: s3://{bucket}/{key}"))]
    NotFound { bucket: String, key: String },

    /// Store construction or request failure.
    #[snafu(display("Failed to fetch s3://{bucket}/{key}: {source}"))]
    Transfer {
        bucket: String,
        key: String,
        source: object_store::Error,
    },

    /// Writing the local copy failed.
    #[snafu(display("Failed to write {}: {source}", path.display()))]
    LocalWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl FetchError {
    /// Check if this error represents a missing object.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

// ============ Partition Errors ============

/// Errors splitting a local blob into per-date files.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PartitionError {
    /// The source file could not be opened.
    #[snafu(display("Failed to open {}: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading the source failed part-way.
    #[snafu(display("Failed to read {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Creating, writing or closing a partition file failed.
    #[snafu(display("Failed to write partition {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The blocking scan task panicked or was cancelled.
    #[snafu(display("Partition task failed: {source}"))]
    PartitionJoin { source: tokio::task::JoinError },
}

// ============ Publish Errors ============

/// Errors pushing partitions to the distributed store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PublishError {
    /// The publish command could not be started.
    #[snafu(display("Failed to execute {command}: {source}"))]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    /// The publish command ran and reported failure.
    #[snafu(display("Chunk push for tag {tag} exited with {status}"))]
    ExitStatus {
        tag: String,
        status: std::process::ExitStatus,
    },

    /// One or more partitions failed after every partition was attempted.
    #[snafu(display("{failed} of {total} chunk pushes failed: {}", tags.join(", ")))]
    Partial {
        failed: usize,
        total: usize,
        tags: Vec<String>,
    },
}

// ============ Process Errors ============

/// Outcome of a processing attempt that did not reach `Done`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProcessError {
    /// Download failed; nothing external was touched.
    #[snafu(display("Fetch failed: {source}"))]
    Fetch { source: FetchError },

    /// Local split failed; nothing external was touched.
    #[snafu(display("Partition failed: {source}"))]
    Partition { source: PartitionError },

    /// Publishing failed; the message was not acknowledged.
    #[snafu(display("Publish failed: {source}"))]
    Publish { source: PublishError },

    /// Every partition was published but the message could not be deleted.
    #[snafu(display("Acknowledge failed: {source}"))]
    Ack { source: QueueError },

    /// Shutdown was requested, either directly or deferred out of the
    /// critical section.
    #[snafu(display("Processing cancelled by {signal}"))]
    Cancelled { signal: String },
}

impl ProcessError {
    /// True if the attempt ended because of a shutdown request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled { .. })
    }
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// The metrics port could not be bound.
    #[snafu(display("Failed to bind metrics server to {addr}"))]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Worker Error (top-level) ============

/// Top-level errors that stop the worker.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum WorkerError {
    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Queue setup error.
    #[snafu(display("Queue error"))]
    Queue { source: QueueError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },

    /// Signal handler registration failed.
    #[snafu(display("Failed to install signal handlers"))]
    SignalInstall { source: std::io::Error },
}
