//! The consumer loop.
//!
//! Long-polls the queue for one message at a time and hands every decoded
//! task to the [`MessageProcessor`]. A failed task is logged, counted and
//! alerted on; the loop itself only stops on shutdown.

mod processor;

pub use processor::{MessageProcessor, ProcessOutcome, local_blob_path};

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::emit;
use crate::error::{ConfigSnafu, QueueSnafu, SignalInstallSnafu, WorkerError};
use crate::metrics::events::{
    Alert, MessageBodyInvalid, MessageBodyUnavailable, MessageFailed, MessageProcessed, PollFailed,
};
use crate::publish::DdfsPublisher;
use crate::queue::{MessageQueue, ReceivedMessage, SqsQueue, decode_envelope};
use crate::signal::{CriticalSectionGuard, UnixSignals, spawn_signal_listener};
use crate::storage::ObjectStoreFetcher;

/// Pause after a failed poll before trying again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Counters for one run of the consumer loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub processed: usize,
    pub failed_get_body: usize,
    pub invalid_body: usize,
    pub failed_to_process: usize,
    pub poll_failures: usize,
}

/// What happened to a single received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Published and acknowledged.
    Processed,
    /// The body was unreadable or malformed. The message is left on the
    /// queue untouched.
    Skipped,
    /// The task was abandoned part-way.
    Failed,
    /// Shutdown was requested while handling the message.
    Shutdown,
}

/// Single-flight poll loop over a [`MessageQueue`].
pub struct Consumer {
    queue: Arc<dyn MessageQueue>,
    processor: MessageProcessor,
    wait: Duration,
    shutdown: CancellationToken,
    stats: WorkerStats,
}

impl Consumer {
    pub fn new(queue: Arc<dyn MessageQueue>, processor: MessageProcessor, wait: Duration) -> Self {
        let shutdown = processor.guard().shutdown_token().clone();
        Self {
            queue,
            processor,
            wait,
            shutdown,
            stats: WorkerStats::default(),
        }
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Poll and process until shutdown.
    pub async fn run(mut self) -> WorkerStats {
        info!(wait_secs = self.wait.as_secs(), "Consumer started");

        loop {
            let polled = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown requested, stopping consumer");
                    break;
                }
                polled = self.queue.poll(self.wait) => polled,
            };

            match polled {
                Ok(Some(message)) => {
                    if self.handle(&message).await == MessageOutcome::Shutdown {
                        info!("Shutdown requested while processing, stopping consumer");
                        break;
                    }
                }
                Ok(None) => debug!("Queue is empty"),
                Err(e) => {
                    warn!(error = %e, "Failed to poll queue");
                    self.stats.poll_failures += 1;
                    emit!(PollFailed);
                    if self
                        .shutdown
                        .run_until_cancelled(tokio::time::sleep(POLL_RETRY_DELAY))
                        .await
                        .is_none()
                    {
                        break;
                    }
                }
            }
        }

        self.stats
    }

    /// Decode and process one received message.
    pub async fn handle(&mut self, message: &ReceivedMessage) -> MessageOutcome {
        let body = match message.body() {
            Ok(body) => {
                info!(message_id = message.id(), "Message received");
                body
            }
            Err(e) => {
                self.stats.failed_get_body += 1;
                emit!(MessageBodyUnavailable);
                emit!(Alert {
                    title: "SQS Message Error",
                    message: &format!("Failed to get message body: {e}"),
                });
                return MessageOutcome::Skipped;
            }
        };

        let task = match decode_envelope(body) {
            Ok(task) => task,
            Err(e) => {
                self.stats.invalid_body += 1;
                emit!(MessageBodyInvalid);
                emit!(Alert {
                    title: "JSON parse error",
                    message: &format!("Invalid message body: {body} ({e})"),
                });
                return MessageOutcome::Skipped;
            }
        };

        info!("Processing: {}", task);
        match self.processor.process(message, &task).await {
            Ok(outcome) => {
                self.stats.processed += 1;
                emit!(MessageProcessed);
                info!(
                    key = %task.path,
                    bytes = outcome.bytes,
                    lines = outcome.lines,
                    partitions = outcome.partitions,
                    "Processed"
                );
                MessageOutcome::Processed
            }
            Err(e) if e.is_cancelled() => {
                info!(key = %task.path, reason = %e, "Task interrupted");
                MessageOutcome::Shutdown
            }
            Err(e) => {
                self.stats.failed_to_process += 1;
                emit!(MessageFailed);
                emit!(Alert {
                    title: "Failed Processing message",
                    message: &format!("Failed to process: {task}: {e}"),
                });
                MessageOutcome::Failed
            }
        }
    }
}

/// Wire up the production worker from `config` and run it until shutdown.
pub async fn run_worker(config: Config) -> Result<WorkerStats, WorkerError> {
    let arn = config.queue_arn().context(ConfigSnafu)?;
    let queue: Arc<dyn MessageQueue> = Arc::new(SqsQueue::connect(&arn).await.context(QueueSnafu)?);

    let guard = Arc::new(CriticalSectionGuard::new(CancellationToken::new()));
    let signals = UnixSignals::install().context(SignalInstallSnafu)?;
    spawn_signal_listener(signals, guard.clone());

    let processor = MessageProcessor::new(
        Arc::new(ObjectStoreFetcher::from_config(&config.storage)),
        Arc::new(DdfsPublisher::new(
            &config.ddfs_binary,
            &config.distributed_store_master,
        )),
        queue.clone(),
        guard,
        &config.work_dir,
        &config.tag_prefix,
    );

    let consumer = Consumer::new(
        queue,
        processor,
        Duration::from_secs(config.wait_time_secs),
    );
    Ok(consumer.run().await)
}
