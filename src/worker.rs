//! This module contains the consumer loop run by each worker of a destination.

use std::{any::Any, num::NonZeroU32, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{
    ack::{AckPolicy, DeliveryOutcome},
    codec::{Codec, Event, WireMessage},
    event_processor::EventProcessor,
    queue_client::QueueClient,
};

/// Pause after a failed receive call before polling again
pub const RECEIVE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Per-destination settings every worker is closed over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Queue to poll
    pub queue_url: String,
    /// Long-poll wait per receive call, in seconds
    pub poll_interval: u32,
    /// Configured max messages per receive call.
    ///
    /// Only reported in the start log; receive calls always ask for one message.
    pub max_messages: NonZeroU32,
}

/// What a worker did with one received message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub outcome: DeliveryOutcome,
    /// Whether a delete call was issued and succeeded
    pub acknowledged: bool,
}

/// One long-poll receive / decode / dispatch / delete loop.
///
/// A worker owns no mutable state. Everything it touches is shared with the
/// other workers of the same destination.
pub struct Worker<Q, C, P> {
    worker_id: u32,
    client: Arc<Q>,
    codec: Arc<C>,
    processor: Arc<P>,
    ack_policy: Arc<dyn AckPolicy>,
    settings: Arc<WorkerSettings>,
}

impl<Q, C, P> Worker<Q, C, P>
where
    Q: QueueClient,
    C: Codec,
    P: EventProcessor,
{
    pub fn new(
        worker_id: u32,
        client: Arc<Q>,
        codec: Arc<C>,
        processor: Arc<P>,
        ack_policy: Arc<dyn AckPolicy>,
        settings: Arc<WorkerSettings>,
    ) -> Self {
        Self {
            worker_id,
            client,
            codec,
            processor,
            ack_policy,
            settings,
        }
    }

    pub fn id(&self) -> u32 {
        self.worker_id
    }

    /// Run the loop until `shutdown` is cancelled.
    ///
    /// The token is only raced against the receive call. Once a message has
    /// been received its decode, dispatch and acknowledgment always complete
    /// before the token is looked at again.
    pub async fn run(self, shutdown: CancellationToken) {
        let worker_id = self.worker_id;
        tracing::info!(
            worker_id,
            queue_url = %self.settings.queue_url,
            poll_interval = self.settings.poll_interval,
            max_messages = self.settings.max_messages.get(),
            "worker loop started"
        );

        loop {
            tracing::trace!(worker_id, "waiting for queue message");

            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = self.client.receive(&self.settings.queue_url, self.settings.poll_interval) => received,
            };

            match received {
                Ok(messages) => {
                    self.handle_batch(messages).await;
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "failed to receive messages");
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(RECEIVE_RETRY_DELAY) => {}
                    }
                }
            }
        }

        tracing::info!(worker_id, "worker loop stopped");
    }

    /// Run a single receive and handle whatever it returned.
    pub async fn poll_once(&self) -> Result<Vec<DeliveryReport>, Q::Error> {
        let messages = self
            .client
            .receive(&self.settings.queue_url, self.settings.poll_interval)
            .await?;

        Ok(self.handle_batch(messages).await)
    }

    async fn handle_batch(&self, messages: Vec<WireMessage>) -> Vec<DeliveryReport> {
        if messages.is_empty() {
            tracing::trace!(worker_id = self.worker_id, "no message within poll wait");
            return Vec::new();
        }

        let mut reports = Vec::with_capacity(messages.len());
        for message in messages {
            reports.push(self.handle_message(message).await);
        }
        reports
    }

    /// Decode, dispatch and acknowledge one message.
    ///
    /// The steps are not transactional. A failure in one is logged and the
    /// next step still runs; whether the message is deleted is decided by the
    /// ack policy alone.
    pub async fn handle_message(&self, message: WireMessage) -> DeliveryReport {
        let worker_id = self.worker_id;

        let outcome = match self.codec.decode(&message) {
            Ok(Some(event)) => self.dispatch(event, &message).await,
            Ok(None) => {
                tracing::debug!(worker_id, message_id = ?message.message_id, "codec declined message, skipping dispatch");
                DeliveryOutcome::Skipped
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, cause = %e.source, "failed to decode message");
                DeliveryOutcome::DecodeFailed
            }
        };

        let acknowledged = if self.ack_policy.should_acknowledge(outcome) {
            self.acknowledge(&message).await
        } else {
            tracing::warn!(
                worker_id,
                message_id = ?message.message_id,
                ?outcome,
                "leaving message on queue for redelivery"
            );
            false
        };

        DeliveryReport {
            outcome,
            acknowledged,
        }
    }

    async fn dispatch(&self, event: Event, message: &WireMessage) -> DeliveryOutcome {
        let worker_id = self.worker_id;
        tracing::debug!(worker_id, ext_id = %event.ext_id, "dispatching event to processor");

        let result = AssertUnwindSafe(self.processor.process_event(event))
            .catch_unwind()
            .await;

        match result {
            Ok(Ok(())) => {
                tracing::debug!(worker_id, "dispatch completed");
                DeliveryOutcome::Processed
            }
            Ok(Err(e)) => {
                tracing::error!(worker_id, message_id = ?message.message_id, error = %e, "event processing failed");
                DeliveryOutcome::ProcessingFailed
            }
            Err(panic) => {
                tracing::error!(
                    worker_id,
                    message_id = ?message.message_id,
                    panic = panic_message(panic.as_ref()),
                    "event processor panicked"
                );
                DeliveryOutcome::ProcessingFailed
            }
        }
    }

    async fn acknowledge(&self, message: &WireMessage) -> bool {
        let worker_id = self.worker_id;

        let Some(receipt_handle) = message.receipt_handle.as_deref() else {
            tracing::error!(worker_id, message_id = ?message.message_id, "message has no receipt handle, cannot delete");
            return false;
        };

        match self
            .client
            .delete(&self.settings.queue_url, receipt_handle)
            .await
        {
            Ok(()) => {
                tracing::debug!(worker_id, message_id = ?message.message_id, "message deleted");
                true
            }
            Err(e) => {
                tracing::error!(worker_id, message_id = ?message.message_id, error = %e, "unable to delete message");
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
