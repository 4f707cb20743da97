//! Publishing partitions into DDFS as tagged chunks.
//!
//! Pushes are best effort: every partition is attempted even after a
//! failure, and the failures are reported together at the end.

use async_trait::async_trait;
use snafu::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{info, warn};

use crate::emit;
use crate::error::{ExitStatusSnafu, PartialSnafu, PublishError, SpawnSnafu};
use crate::metrics::events::{ChunkPublished, ChunkStatus};
use crate::partition::Partition;

/// Pushes one local file into the distributed store under a tag.
#[async_trait]
pub trait ChunkPublisher: Send + Sync {
    async fn push(&self, tag: &str, path: &Path) -> Result<(), PublishError>;
}

/// Runs `ddfs --master <master> chunk <tag> <path>`.
#[derive(Debug, Clone)]
pub struct DdfsPublisher {
    binary: PathBuf,
    master: String,
}

impl DdfsPublisher {
    pub fn new(binary: impl Into<PathBuf>, master: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            master: master.into(),
        }
    }

    fn command_line(&self, tag: &str, path: &Path) -> String {
        format!(
            "{} --master {} chunk {} {}",
            self.binary.display(),
            self.master,
            tag,
            path.display()
        )
    }
}

#[async_trait]
impl ChunkPublisher for DdfsPublisher {
    async fn push(&self, tag: &str, path: &Path) -> Result<(), PublishError> {
        let command = self.command_line(tag, path);
        info!("Executing: {}", command);

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--master")
            .arg(&self.master)
            .arg("chunk")
            .arg(tag)
            .arg(path)
            .stdin(Stdio::null())
            .kill_on_drop(false);

        // Own process group: a Ctrl-C sent to the worker's group must not
        // kill a push that the worker is deferring the signal for.
        #[cfg(unix)]
        cmd.process_group(0);

        let status = cmd.status().await.context(SpawnSnafu { command })?;
        ensure!(status.success(), ExitStatusSnafu { tag, status });
        Ok(())
    }
}

/// Outcome of publishing every partition of one blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub published: usize,
}

/// `<prefix><label>:<date>`
pub fn chunk_tag(tag_prefix: &str, label: &str, date: &str) -> String {
    format!("{tag_prefix}{label}:{date}")
}

/// Push every partition, continuing past failures.
///
/// Returns [`PublishError::Partial`] naming the failed tags if any push
/// failed.
pub async fn publish_partitions(
    publisher: &dyn ChunkPublisher,
    partitions: &[Partition],
    tag_prefix: &str,
    label: &str,
) -> Result<PublishSummary, PublishError> {
    let mut failed_tags = Vec::new();

    for partition in partitions {
        let tag = chunk_tag(tag_prefix, label, &partition.date);
        let start = Instant::now();

        let status = match publisher.push(&tag, &partition.path).await {
            Ok(()) => ChunkStatus::Success,
            Err(e) => {
                warn!(tag = %tag, error = %e, "Chunk push failed, continuing with remaining partitions");
                failed_tags.push(tag);
                ChunkStatus::Failed
            }
        };

        emit!(ChunkPublished {
            status,
            duration: start.elapsed(),
        });
    }

    ensure!(
        failed_tags.is_empty(),
        PartialSnafu {
            failed: failed_tags.len(),
            total: partitions.len(),
            tags: failed_tags,
        }
    );

    Ok(PublishSummary {
        published: partitions.len(),
    })
}
