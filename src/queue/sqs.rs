//! Amazon SQS implementation of [`MessageQueue`].

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_sqs::config::Region;
use aws_sdk_sqs::Client;
use snafu::prelude::*;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::QueueArn;
use crate::error::{
    ConnectSnafu, DeleteSnafu, MissingQueueUrlSnafu, MissingReceiptSnafu, QueueError,
    ReceiveSnafu,
};

use super::{MessageQueue, ReceivedMessage};

/// SQS queue resolved from its ARN.
#[derive(Debug, Clone)]
pub struct SqsQueue {
    client: Client,
    queue_url: String,
}

impl SqsQueue {
    /// Build a client for the ARN's region and resolve the queue URL.
    pub async fn connect(arn: &QueueArn) -> Result<Self, QueueError> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(arn.region.clone()))
            .load()
            .await;
        let client = Client::new(&sdk_config);

        let output = client
            .get_queue_url()
            .queue_name(&arn.name)
            .queue_owner_aws_account_id(&arn.account)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)
            .context(ConnectSnafu {
                arn: arn.to_string(),
            })?;

        let queue_url = output
            .queue_url()
            .context(MissingQueueUrlSnafu {
                arn: arn.to_string(),
            })?
            .to_string();

        info!(queue_url = %queue_url, "Connected to SQS queue");
        Ok(Self { client, queue_url })
    }
}

#[async_trait]
impl MessageQueue for SqsQueue {
    async fn poll(&self, wait: Duration) -> Result<Option<ReceivedMessage>, QueueError> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(wait.as_secs() as i32)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)
            .context(ReceiveSnafu)?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };

        let id = message.message_id().unwrap_or("<unknown>");
        debug!(message_id = id, "Received message");
        Ok(Some(ReceivedMessage::new(
            id,
            message.body().map(str::to_string),
            message.receipt_handle().map(str::to_string),
        )))
    }

    async fn delete(&self, message: &ReceivedMessage) -> Result<(), QueueError> {
        let receipt = message.receipt().context(MissingReceiptSnafu {
            message_id: message.id(),
        })?;

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)
            .context(DeleteSnafu {
                message_id: message.id(),
            })?;

        Ok(())
    }
}
