//! Processing of one decoded task.
//!
//! A task moves through `Fetching → Partitioning → Publishing → Acknowledging
//! → CleaningUp → Done`. Publishing and acknowledging run inside a critical
//! section: shutdown signals arriving there are held back until the message
//! is either fully committed or abandoned.

use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::emit;
use crate::error::{
    AckSnafu, CancelledSnafu, FetchSnafu, PartitionError, PartitionJoinSnafu, PartitionSnafu,
    ProcessError, PublishSnafu,
};
use crate::metrics::events::{BlobPartitioned, CleanupFailed};
use crate::partition::{Partition, SplitResult, split_by_date};
use crate::publish::{ChunkPublisher, PublishSummary, publish_partitions};
use crate::queue::{MessageQueue, ReceivedMessage, Task};
use crate::signal::CriticalSectionGuard;
use crate::storage::BlobFetcher;

/// Reported as the cause when shutdown was already underway before the
/// critical section.
const SHUTDOWN_REQUESTED: &str = "shutdown request";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProcessStage {
    Fetching,
    Partitioning,
    Publishing,
    Acknowledging,
    CleaningUp,
    Done,
}

impl ProcessStage {
    fn as_str(&self) -> &'static str {
        match self {
            ProcessStage::Fetching => "fetching",
            ProcessStage::Partitioning => "partitioning",
            ProcessStage::Publishing => "publishing",
            ProcessStage::Acknowledging => "acknowledging",
            ProcessStage::CleaningUp => "cleaning_up",
            ProcessStage::Done => "done",
        }
    }
}

/// Summary of a task that reached `Done`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub bytes: u64,
    pub lines: u64,
    pub partitions: usize,
}

/// `<work_dir>/<path with '/' replaced by '.'>`
pub fn local_blob_path(work_dir: &Path, key: &str) -> PathBuf {
    work_dir.join(key.replace('/', "."))
}

/// Runs tasks against the fetcher, publisher and queue it was built with.
pub struct MessageProcessor {
    fetcher: Arc<dyn BlobFetcher>,
    publisher: Arc<dyn ChunkPublisher>,
    queue: Arc<dyn MessageQueue>,
    guard: Arc<CriticalSectionGuard>,
    work_dir: PathBuf,
    tag_prefix: String,
}

impl MessageProcessor {
    pub fn new(
        fetcher: Arc<dyn BlobFetcher>,
        publisher: Arc<dyn ChunkPublisher>,
        queue: Arc<dyn MessageQueue>,
        guard: Arc<CriticalSectionGuard>,
        work_dir: impl Into<PathBuf>,
        tag_prefix: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            publisher,
            queue,
            guard,
            work_dir: work_dir.into(),
            tag_prefix: tag_prefix.into(),
        }
    }

    pub fn guard(&self) -> &Arc<CriticalSectionGuard> {
        &self.guard
    }

    /// Run `task`, received as `message`, to completion.
    ///
    /// The message is deleted only after every partition was published. On
    /// any error the local files are left in the work directory.
    pub async fn process(
        &self,
        message: &ReceivedMessage,
        task: &Task,
    ) -> Result<ProcessOutcome, ProcessError> {
        let shutdown = self.guard.shutdown_token();
        let local = local_blob_path(&self.work_dir, &task.path);
        ensure!(
            !shutdown.is_cancelled(),
            CancelledSnafu {
                signal: SHUTDOWN_REQUESTED
            }
        );

        self.enter(ProcessStage::Fetching, task);
        let bytes = shutdown
            .run_until_cancelled(self.fetcher.fetch(&task.bucket, &task.path, &local))
            .await
            .context(CancelledSnafu {
                signal: SHUTDOWN_REQUESTED,
            })?
            .context(FetchSnafu)?;

        self.enter(ProcessStage::Partitioning, task);
        let split = shutdown
            .run_until_cancelled(partition_blob(local.clone()))
            .await
            .context(CancelledSnafu {
                signal: SHUTDOWN_REQUESTED,
            })?
            .context(PartitionSnafu)?;
        emit!(BlobPartitioned {
            lines: split.lines,
            partitions: split.partitions.len(),
        });

        self.enter(ProcessStage::Publishing, task);
        let Some(section) = self.guard.arm() else {
            return CancelledSnafu {
                signal: SHUTDOWN_REQUESTED,
            }
            .fail();
        };
        let committed = self.publish_and_ack(message, task, &split.partitions).await;
        if let Err(interrupted) = section.release() {
            if let Err(error) = &committed {
                warn!(
                    key = %task.path,
                    error = %error,
                    "Critical section failed before the deferred signal was replayed"
                );
            }
            return CancelledSnafu {
                signal: interrupted.received.signal.as_str(),
            }
            .fail();
        }
        committed?;

        self.enter(ProcessStage::CleaningUp, task);
        self.clean(&local, &split.partitions).await;

        self.enter(ProcessStage::Done, task);
        Ok(ProcessOutcome {
            bytes,
            lines: split.lines,
            partitions: split.partitions.len(),
        })
    }

    async fn publish_and_ack(
        &self,
        message: &ReceivedMessage,
        task: &Task,
        partitions: &[Partition],
    ) -> Result<PublishSummary, ProcessError> {
        let summary = publish_partitions(
            self.publisher.as_ref(),
            partitions,
            &self.tag_prefix,
            &task.label,
        )
        .await
        .context(PublishSnafu)?;
        info!(
            key = %task.path,
            published = summary.published,
            "Published partitions"
        );

        self.enter(ProcessStage::Acknowledging, task);
        self.queue.delete(message).await.context(AckSnafu)?;
        Ok(summary)
    }

    /// Remove the local blob and its partitions. Failures are counted only.
    async fn clean(&self, local: &Path, partitions: &[Partition]) {
        let paths = std::iter::once(local).chain(partitions.iter().map(|p| p.path.as_path()));
        for path in paths {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove local file");
                emit!(CleanupFailed);
            }
        }
    }

    fn enter(&self, stage: ProcessStage, task: &Task) {
        debug!(
            bucket = %task.bucket,
            key = %task.path,
            stage = stage.as_str(),
            "Processing stage"
        );
    }
}

async fn partition_blob(source: PathBuf) -> Result<SplitResult, PartitionError> {
    tokio::task::spawn_blocking(move || split_by_date(&source))
        .await
        .context(PartitionJoinSnafu)?
}
