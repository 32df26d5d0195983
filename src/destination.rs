//! This module contains the destination: the lifecycle that ties configuration,
//! the queue client, and the worker pool together.

use std::{collections::HashMap, sync::Arc};

use futures::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::{
    ack::AckPolicy,
    codec::{Codec, Event},
    config::AdapterConfig,
    error::{ConnectionError, PublishError},
    event_processor::EventProcessor,
    job_pool::JobPool,
    queue_client::{Connect, QueueClient},
    worker::{Worker, WorkerSettings},
};

/// Where a destination is in its lifecycle.
///
/// Transitions are expected in declaration order. Calling a step out of order
/// is not an error; it just has nothing to work with (e.g. `start` before
/// `bind` submits no workers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Connected,
    Bound,
    Running,
    Closed,
}

/// A queue destination: consumes messages with a pool of workers and publishes events.
///
/// # Type Parameters
///
/// * `K` - Builds the queue client on `connect`
/// * `C` - The codec shared by workers and `send`
/// * `P` - The event processor supplied to `bind`
pub struct Destination<K, C, P>
where
    K: Connect,
{
    state: LifecycleState,
    connector: K,
    codec: Arc<C>,
    job_pool: Arc<dyn JobPool>,
    ack_policy: Option<Arc<dyn AckPolicy>>,
    config: Option<AdapterConfig>,
    client: Option<Arc<K::Client>>,
    workers: Option<Vec<Worker<K::Client, C, P>>>,
    shutdown: CancellationToken,
}

impl<K, C, P> Destination<K, C, P>
where
    K: Connect,
    C: Codec,
    P: EventProcessor,
{
    /// Create a destination that will submit its workers to `job_pool`.
    pub fn new(connector: K, codec: C, job_pool: Arc<dyn JobPool>) -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            connector,
            codec: Arc::new(codec),
            job_pool,
            ack_policy: None,
            config: None,
            client: None,
            workers: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Replace the configured acknowledgment strategy with a custom policy (builder pattern)
    pub fn with_ack_policy(mut self, policy: impl AckPolicy) -> Self {
        self.ack_policy = Some(Arc::new(policy));
        self
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> Option<&AdapterConfig> {
        self.config.as_ref()
    }

    /// Token cancelled by [`stop`](Self::stop); every worker holds a child of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Resolve configuration from destination properties. Never fails.
    pub fn init(&mut self, properties: &HashMap<String, String>) {
        self.init_with_config(AdapterConfig::from_properties(properties));
    }

    pub fn init_with_config(&mut self, config: AdapterConfig) {
        tracing::debug!(queue_url = %config.queue_url, "initialising destination");

        self.config = Some(config);
        self.state = LifecycleState::Initialized;

        tracing::debug!("destination initialised");
    }

    /// Resolve credentials and build the queue client.
    ///
    /// Calling this again closes and replaces the client. Workers bound to the
    /// old client see their calls fail until they are stopped or bound again.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        let config = self.config.as_ref().ok_or(ConnectionError::NotInitialized)?;

        tracing::debug!(region = ?config.region, "connecting to queue");

        let client = self.connector.connect(config).await?;
        let queue_url = config.queue_url.clone();

        if let Some(previous) = self.client.replace(Arc::new(client)) {
            if self.workers.is_some() {
                tracing::warn!("reconnecting while workers are bound to the previous client");
            }
            match previous.close().await {
                Ok(()) => tracing::debug!("closed replaced queue client"),
                Err(e) => tracing::error!(error = %e, "failed to close replaced queue client"),
            }
        }
        self.state = LifecycleState::Connected;

        tracing::info!(queue_url = %queue_url, "connected to queue");
        Ok(())
    }

    /// Create one worker per configured consumer thread. Nothing runs yet.
    pub fn bind(&mut self, processor: P) {
        let (Some(config), Some(client)) = (self.config.as_ref(), self.client.as_ref()) else {
            tracing::warn!("bind called before connect, no workers created");
            self.workers = Some(Vec::new());
            return;
        };

        let processor = Arc::new(processor);
        let ack_policy = self
            .ack_policy
            .clone()
            .unwrap_or_else(|| Arc::new(config.ack_strategy()));
        let settings = Arc::new(WorkerSettings {
            queue_url: config.queue_url.clone(),
            poll_interval: config.poll_interval(),
            max_messages: config.max_messages(),
        });

        let workers: Vec<_> = (0..config.worker_count())
            .map(|worker_id| {
                Worker::new(
                    worker_id,
                    Arc::clone(client),
                    Arc::clone(&self.codec),
                    Arc::clone(&processor),
                    Arc::clone(&ack_policy),
                    Arc::clone(&settings),
                )
            })
            .collect();

        tracing::debug!(worker_count = workers.len(), "bound workers to destination");

        self.workers = Some(workers);
        self.state = LifecycleState::Bound;
    }

    /// Submit every bound worker to the job pool and return how many were submitted.
    ///
    /// Workers are consumed; a second call submits nothing.
    pub fn start(&mut self) -> usize {
        let Some(workers) = self.workers.take() else {
            tracing::debug!("start called before bind, nothing to submit");
            return 0;
        };

        let submitted = workers.len();
        for worker in workers {
            tracing::debug!(worker_id = worker.id(), "submitting worker");
            let shutdown = self.shutdown.child_token();
            self.job_pool.submit(worker.run(shutdown).boxed());
        }

        self.state = LifecycleState::Running;
        tracing::info!(worker_count = submitted, "destination started");
        submitted
    }

    /// Publish an event onto the queue.
    ///
    /// Failures are logged and swallowed: the caller never sees a delivery error.
    pub async fn send(&self, event: &Event) {
        match self.publish(event).await {
            Ok(()) => {
                tracing::debug!(ext_id = %event.ext_id, "sent message to queue");
            }
            Err(e) => {
                tracing::error!(ext_id = %event.ext_id, error = %e, "unable to send message to queue");
            }
        }
    }

    async fn publish(&self, event: &Event) -> Result<(), PublishError> {
        let (Some(config), Some(client)) = (self.config.as_ref(), self.client.as_ref()) else {
            return Err(PublishError::NotConnected);
        };

        if let Err(e) = self.codec.encode(event) {
            tracing::warn!(ext_id = %event.ext_id, error = %e, cause = %e.source, "codec failed to encode event, publishing raw payload");
        }
        let body = String::from_utf8_lossy(&event.payload);

        client
            .send(&config.queue_url, &body)
            .await
            .map_err(|e| PublishError::Client(e.to_string()))
    }

    /// Release the queue client.
    ///
    /// Running workers are not stopped; their calls start failing and are
    /// logged. Use [`stop`](Self::stop) to end the worker loops.
    pub async fn close(&mut self) {
        if self.state == LifecycleState::Closed {
            return;
        }

        tracing::debug!("closing queue client");

        if let Some(client) = self.client.take() {
            match client.close().await {
                Ok(()) => tracing::debug!("queue client closed"),
                Err(e) => tracing::error!(error = %e, "failed to close queue client"),
            }
        }

        self.state = LifecycleState::Closed;
    }

    /// Ask every worker to stop after its current message.
    pub fn stop(&self) {
        tracing::info!("stopping destination workers");
        self.shutdown.cancel();
    }
}
