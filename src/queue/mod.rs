//! Queue abstraction and notification decoding.
//!
//! The worker only needs three operations from a queue: a long poll that
//! yields at most one message, reading that message's body, and deleting it
//! once its data has been published.

mod envelope;
mod sqs;

pub use envelope::{Task, decode_envelope};
pub use sqs::SqsQueue;

use async_trait::async_trait;
use snafu::prelude::*;
use std::time::Duration;

use crate::error::{MissingBodySnafu, QueueError};

/// A message handed out by [`MessageQueue::poll`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    id: String,
    body: Option<String>,
    receipt: Option<String>,
}

impl ReceivedMessage {
    pub fn new(id: impl Into<String>, body: Option<String>, receipt: Option<String>) -> Self {
        Self {
            id: id.into(),
            body,
            receipt,
        }
    }

    /// Queue-assigned message id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The raw envelope text.
    pub fn body(&self) -> Result<&str, QueueError> {
        self.body.as_deref().context(MissingBodySnafu {
            message_id: &self.id,
        })
    }

    /// Handle used to delete the message.
    pub fn receipt(&self) -> Option<&str> {
        self.receipt.as_deref()
    }
}

/// A queue the consumer loop reads from.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Wait up to `wait` for a message. `Ok(None)` means the wait elapsed.
    async fn poll(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError>;

    /// Acknowledge a message so it is never redelivered.
    async fn delete(&self, message: &ReceivedMessage) -> Result<(), QueueError>;
}
