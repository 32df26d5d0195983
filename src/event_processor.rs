//! This module provides the capability workers dispatch decoded events to.

use std::{future::Future, sync::Arc};

use crate::codec::Event;

/// Error returned by an [`EventProcessor`].
pub type ProcessingError = Box<dyn std::error::Error + Send + Sync>;

/// A trait for the business logic that handles each decoded event.
///
/// The trait uses `Box<dyn std::error::Error + Send + Sync>` for maximum flexibility
/// in error handling - you can return any error type that implements the standard Error trait.
///
/// # Error Handling
///
/// Processing errors are logged by the worker. Whether the message is then
/// deleted is up to the destination's [`AckPolicy`](crate::AckPolicy). With the
/// default [`AckStrategy::Always`](crate::AckStrategy::Always) it is deleted
/// anyway, so a failed event is not redelivered.
///
/// A panic inside `process_event` is caught and treated like an error.
///
/// # Examples
///
/// ```rust
/// use castor::{Event, EventProcessor, ProcessingError};
///
/// struct OrderProcessor;
///
/// impl EventProcessor for OrderProcessor {
///     async fn process_event(&self, event: Event) -> Result<(), ProcessingError> {
///         let body = String::from_utf8(event.payload)?;
///         if body.is_empty() {
///             return Err("empty order".into());
///         }
///         println!("order {}: {}", event.ext_id, body);
///         Ok(())
///     }
/// }
/// ```
pub trait EventProcessor: Send + Sync + 'static {
    /// Process a single event
    fn process_event(&self, event: Event)
    -> impl Future<Output = Result<(), ProcessingError>> + Send;
}

impl<T: EventProcessor> EventProcessor for Arc<T> {
    fn process_event(
        &self,
        event: Event,
    ) -> impl Future<Output = Result<(), ProcessingError>> + Send {
        self.as_ref().process_event(event)
    }
}
