//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the worker.
//! Emission is fire-and-forget: with no recorder installed the calls are
//! no-ops.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::{error, trace};

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

// ============================================================================
// Message outcome counters
// ============================================================================

/// A message went through the whole pipeline and was acknowledged.
pub struct MessageProcessed;

impl InternalEvent for MessageProcessed {
    fn emit(self) {
        trace!("Message processed");
        counter!("drift_messages_processed_total").increment(1);
    }
}

/// The body of a received message could not be read.
pub struct MessageBodyUnavailable;

impl InternalEvent for MessageBodyUnavailable {
    fn emit(self) {
        trace!("Failed to get message body");
        counter!("drift_messages_failed_get_body_total").increment(1);
    }
}

/// The body of a received message did not decode into a task.
pub struct MessageBodyInvalid;

impl InternalEvent for MessageBodyInvalid {
    fn emit(self) {
        trace!("Invalid message body");
        counter!("drift_messages_invalid_body_total").increment(1);
    }
}

/// A decoded task was abandoned.
pub struct MessageFailed;

impl InternalEvent for MessageFailed {
    fn emit(self) {
        trace!("Message failed to process");
        counter!("drift_messages_failed_to_process_total").increment(1);
    }
}

/// The long poll itself failed.
pub struct PollFailed;

impl InternalEvent for PollFailed {
    fn emit(self) {
        trace!("Queue poll failed");
        counter!("drift_poll_failures_total").increment(1);
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Alert-level event carrying a human-readable message.
///
/// Logged at error level and counted per title.
pub struct Alert<'a> {
    pub title: &'static str,
    pub message: &'a str,
}

impl InternalEvent for Alert<'_> {
    fn emit(self) {
        error!(alert = self.title, "{}", self.message);
        counter!("drift_alerts_total", "title" => self.title).increment(1);
    }
}

// ============================================================================
// Stage events
// ============================================================================

/// Event emitted when a blob download completes.
pub struct BlobDownloaded {
    pub bytes: u64,
    pub duration: Duration,
}

impl InternalEvent for BlobDownloaded {
    fn emit(self) {
        trace!(
            bytes = self.bytes,
            duration_ms = self.duration.as_millis(),
            "Blob downloaded"
        );
        counter!("drift_bytes_downloaded_total").increment(self.bytes);
        histogram!("drift_download_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// Event emitted when a blob has been split.
pub struct BlobPartitioned {
    pub lines: u64,
    pub partitions: usize,
}

impl InternalEvent for BlobPartitioned {
    fn emit(self) {
        trace!(
            lines = self.lines,
            partitions = self.partitions,
            "Blob partitioned"
        );
        counter!("drift_lines_partitioned_total").increment(self.lines);
        histogram!("drift_partitions_per_blob").record(self.partitions as f64);
    }
}

/// Status of a single chunk push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Success,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Success => "success",
            ChunkStatus::Failed => "failed",
        }
    }
}

/// Event emitted after every chunk push attempt.
pub struct ChunkPublished {
    pub status: ChunkStatus,
    pub duration: Duration,
}

impl InternalEvent for ChunkPublished {
    fn emit(self) {
        trace!(
            status = self.status.as_str(),
            duration_ms = self.duration.as_millis(),
            "Chunk push finished"
        );
        counter!("drift_chunks_published_total", "status" => self.status.as_str()).increment(1);
        histogram!("drift_chunk_push_duration_seconds").record(self.duration.as_secs_f64());
    }
}

/// A local file could not be removed after acknowledgment.
pub struct CleanupFailed;

impl InternalEvent for CleanupFailed {
    fn emit(self) {
        trace!("Cleanup failed");
        counter!("drift_cleanup_failures_total").increment(1);
    }
}

/// A shutdown signal arrived while the critical section was armed.
pub struct SignalDeferred {
    pub signal: &'static str,
}

impl InternalEvent for SignalDeferred {
    fn emit(self) {
        trace!(signal = self.signal, "Signal deferred");
        counter!("drift_signals_deferred_total", "signal" => self.signal).increment(1);
    }
}
