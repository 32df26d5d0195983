//! # Castor
//!
//! An Amazon SQS channel adapter. A [`Destination`] consumes queued messages with
//! a fixed pool of long-polling workers, hands them to your [`EventProcessor`],
//! and publishes events back onto the queue.
//!
//! ## Features
//!
//! - **Lifecycle State Machine**: `init` → `connect` → `bind` → `start`, then `close` and `stop`
//! - **Fixed Worker Pool**: One long-poll loop per configured consumer thread, submitted to a [`JobPool`] you own
//! - **Pluggable Codec**: Map queue messages to events and back by implementing [`Codec`]
//! - **Acknowledgment Policy**: Delete every message (default) or only successfully processed ones
//! - **Role Assumption**: Static keys, an assumed role, or the default AWS credential chain
//! - **Graceful Stop**: Workers finish their current message and exit when the destination is stopped
//! - **Structured Logging**: Every swallowed failure is logged through `tracing` with the worker id
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::{collections::HashMap, sync::Arc};
//!
//! use castor::{Destination, Event, EventProcessor, ProcessingError, SqsConnector, TextCodec};
//!
//! struct PrintProcessor;
//!
//! impl EventProcessor for PrintProcessor {
//!     async fn process_event(&self, event: Event) -> Result<(), ProcessingError> {
//!         println!("{}: {}", event.ext_id, String::from_utf8_lossy(&event.payload));
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let properties: HashMap<String, String> = [
//!     ("aws.region", "us-east-1"),
//!     ("queue.url", "https://sqs.us-east-1.amazonaws.com/123456789012/orders"),
//!     ("consumer.threads", "2"),
//!     ("poll.interval", "20"),
//! ]
//! .into_iter()
//! .map(|(k, v)| (k.to_string(), v.to_string()))
//! .collect();
//!
//! let job_pool = Arc::new(tokio::runtime::Handle::current());
//! let mut destination = Destination::new(SqsConnector, TextCodec, job_pool);
//!
//! destination.init(&properties);
//! destination.connect().await?;
//! destination.bind(PrintProcessor);
//! destination.start();
//!
//! destination.send(&Event::new("hello", "greeting-1")).await;
//!
//! tokio::signal::ctrl_c().await?;
//! destination.stop();
//! destination.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Delivery Semantics
//!
//! Each worker receives one message per call, decodes it, dispatches it, and
//! then deletes it. With the default [`AckStrategy::Always`] the delete happens
//! whether or not decoding or processing succeeded, so from the processor's
//! point of view delivery is at-most-once even though the queue itself is
//! at-least-once. [`AckStrategy::OnlyOnSuccess`] leaves failed messages for the
//! queue to redeliver.
//!
//! The `max.messages` property is accepted but not forwarded: receive calls
//! always ask for a single message.

pub mod ack;
pub mod codec;
pub mod config;
pub mod credentials;
pub mod destination;
pub mod error;
pub mod event_processor;
pub mod job_pool;
pub mod queue_client;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use ack::{AckPolicy, AckStrategy, DeliveryOutcome};
pub use codec::{Codec, Event, TextCodec, WireMessage};
pub use config::{AdapterConfig, ConfigParseError, Setting};
pub use credentials::{CredentialDescriptor, CredentialError, SessionCredentials, resolve_credentials};
pub use destination::{Destination, LifecycleState};
pub use error::{ConnectionError, DecodeError, EncodeError, PublishError};
pub use event_processor::{EventProcessor, ProcessingError};
pub use job_pool::JobPool;
pub use queue_client::{Connect, QueueClient, SqsConnector, SqsQueueClient};
pub use worker::{DeliveryReport, Worker, WorkerSettings};
