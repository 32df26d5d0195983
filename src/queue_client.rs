//! This module provides the queue client facade shared by all workers of a destination.

use std::{future::Future, sync::RwLock};

use aws_credential_types::Credentials;
use aws_sdk_sqs::config::{BehaviorVersion, Region};
use thiserror::Error;

use crate::{
    codec::WireMessage,
    config::AdapterConfig,
    credentials::resolve_credentials,
    error::{BoxError, ConnectionError},
};

/// Number of messages requested per receive call.
///
/// The configured max-messages value is not forwarded; workers handle one
/// message per call.
pub const RECEIVE_BATCH_SIZE: i32 = 1;

/// The calls a destination and its workers make against the queue service.
///
/// Implementations must be safe to call concurrently from every worker; no
/// locking is done on the caller's side.
pub trait QueueClient: Send + Sync + 'static {
    /// The error that can be returned by the client
    type Error: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static;

    /// Long-poll for messages, waiting up to `wait_seconds` when the queue is empty.
    ///
    /// Returns an empty vec when nothing arrived within the wait.
    fn receive(
        &self,
        queue_url: &str,
        wait_seconds: u32,
    ) -> impl Future<Output = Result<Vec<WireMessage>, Self::Error>> + Send;

    /// Delete a received message using its receipt handle
    fn delete(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Publish a message body
    fn send(&self, queue_url: &str, body: &str)
    -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Release the underlying connection. Later calls fail.
    fn close(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Builds a queue client from configuration.
pub trait Connect: Send + Sync + 'static {
    type Client: QueueClient;

    fn connect(
        &self,
        config: &AdapterConfig,
    ) -> impl Future<Output = Result<Self::Client, ConnectionError>> + Send;
}

#[derive(Debug, Error)]
pub enum SqsClientError {
    #[error("sqs client has been closed")]
    Closed,

    #[error("receipt handle is empty")]
    EmptyReceiptHandle,

    #[error(transparent)]
    Sqs(#[from] aws_sdk_sqs::Error),
}

/// [`QueueClient`] backed by the AWS SDK.
#[derive(Debug)]
pub struct SqsQueueClient {
    inner: RwLock<Option<aws_sdk_sqs::Client>>,
}

impl SqsQueueClient {
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self {
            inner: RwLock::new(Some(client)),
        }
    }

    /// Clone the SDK client out of the lock so no guard is held across an await.
    fn client(&self) -> Result<aws_sdk_sqs::Client, SqsClientError> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(SqsClientError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl QueueClient for SqsQueueClient {
    type Error = SqsClientError;

    async fn receive(
        &self,
        queue_url: &str,
        wait_seconds: u32,
    ) -> Result<Vec<WireMessage>, Self::Error> {
        let output = self
            .client()?
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(RECEIVE_BATCH_SIZE)
            .wait_time_seconds(i32::try_from(wait_seconds).unwrap_or(i32::MAX))
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        Ok(output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(WireMessage::from)
            .collect())
    }

    async fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), Self::Error> {
        if receipt_handle.is_empty() {
            return Err(SqsClientError::EmptyReceiptHandle);
        }

        self.client()?
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        Ok(())
    }

    async fn send(&self, queue_url: &str, body: &str) -> Result<(), Self::Error> {
        self.client()?
            .send_message()
            .queue_url(queue_url)
            .message_body(body)
            .send()
            .await
            .map_err(aws_sdk_sqs::Error::from)?;

        Ok(())
    }

    async fn close(&self) -> Result<(), Self::Error> {
        let previous = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        match previous {
            Some(_) => Ok(()),
            None => Err(SqsClientError::Closed),
        }
    }
}

/// Resolves credentials and builds an [`SqsQueueClient`] for the configured region.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqsConnector;

impl Connect for SqsConnector {
    type Client = SqsQueueClient;

    async fn connect(&self, config: &AdapterConfig) -> Result<SqsQueueClient, ConnectionError> {
        let credentials = resolve_credentials(&config.credentials, config.region.as_deref()).await?;

        let region = match config.region.as_deref() {
            Some(region) => Region::new(region.to_string()),
            None => {
                return Err(ConnectionError::Client(BoxError::from(
                    "no region configured for the queue client",
                )));
            }
        };

        let mut builder = aws_sdk_sqs::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(Credentials::from(credentials));

        if let Some(endpoint) = config.endpoint_url.as_deref() {
            builder = builder.endpoint_url(endpoint);
        }

        tracing::debug!(queue_url = %config.queue_url, "built sqs client");

        Ok(SqsQueueClient::new(aws_sdk_sqs::Client::from_conf(
            builder.build(),
        )))
    }
}
