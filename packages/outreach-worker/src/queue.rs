use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

/// One delivery from the queue. At-least-once: the same job reference may
/// arrive more than once, and the claim step is what makes that harmless.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: Option<String>,
    pub receipt_handle: String,
    pub body: String,
}

/// Structured message body carrying the job reference.
#[derive(Debug, Clone, Deserialize)]
pub struct JobRef {
    pub job_id: Uuid,
}

impl JobRef {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).context("malformed queue message body")
    }
}

/// Delivery interface the worker polls.
///
/// `receive` is a bounded long poll; an un-deleted message reappears after
/// the visibility window, which is the whole redelivery mechanism.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn receive(&self) -> Result<Vec<QueueMessage>>;
    async fn delete(&self, receipt_handle: &str) -> Result<()>;
}

/// SQS-backed queue adapter.
pub struct SqsQueue {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    wait_time_seconds: i32,
    visibility_timeout: i32,
}

impl SqsQueue {
    /// Build a client from the ambient AWS environment (credentials chain,
    /// region), with an optional region override.
    pub async fn connect(
        queue_url: String,
        region: Option<String>,
        wait_time_seconds: i32,
        visibility_timeout: i32,
    ) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        Self {
            client: aws_sdk_sqs::Client::new(&config),
            queue_url,
            wait_time_seconds,
            visibility_timeout,
        }
    }
}

#[async_trait]
impl JobQueue for SqsQueue {
    async fn receive(&self) -> Result<Vec<QueueMessage>> {
        let response = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(1)
            .wait_time_seconds(self.wait_time_seconds)
            .visibility_timeout(self.visibility_timeout)
            .send()
            .await
            .context("failed to receive from queue")?;

        let messages = response
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|message| {
                let receipt_handle = message.receipt_handle?;
                Some(QueueMessage {
                    message_id: message.message_id,
                    receipt_handle,
                    body: message.body.unwrap_or_default(),
                })
            })
            .collect();
        Ok(messages)
    }

    async fn delete(&self, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .context("failed to delete queue message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ref_parses_body() {
        let body = r#"{"job_id":"15d64445-c8b7-4639-994d-865844fbcce9"}"#;
        let job_ref = JobRef::parse(body).unwrap();
        assert_eq!(
            job_ref.job_id,
            "15d64445-c8b7-4639-994d-865844fbcce9".parse::<Uuid>().unwrap()
        );
    }

    #[test]
    fn test_job_ref_rejects_garbage() {
        assert!(JobRef::parse("not json").is_err());
        assert!(JobRef::parse(r#"{"job_id":"not-a-uuid"}"#).is_err());
        assert!(JobRef::parse(r#"{}"#).is_err());
    }
}
