//! Error types shared across the adapter.
//!
//! Only [`ConnectionError`] ever reaches the caller of the lifecycle API. The
//! others are produced inside the worker loop or `send` and end up in the log.

use thiserror::Error;

use crate::credentials::CredentialError;

/// Boxed error used for failures whose concrete type belongs to someone else.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure to establish the client handle in `connect()`.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// `connect()` was called before `init()`.
    #[error("destination has not been initialised")]
    NotInitialized,

    /// Credential resolution failed.
    #[error("credential resolution failed")]
    Credentials(#[from] CredentialError),

    /// The queue client could not be constructed.
    #[error("failed to build queue client")]
    Client(#[source] BoxError),
}

/// A codec could not turn a wire message into an event.
#[derive(Debug, Error)]
#[error("failed to decode message {message_id:?}")]
pub struct DecodeError {
    pub message_id: Option<String>,
    #[source]
    pub source: BoxError,
}

/// A codec could not turn an event into a wire message.
///
/// Logged by `Destination::send`; the event is still published.
#[derive(Debug, Error)]
#[error("failed to encode event {ext_id:?}")]
pub struct EncodeError {
    pub ext_id: String,
    #[source]
    pub source: BoxError,
}

/// Publishing an event failed. Logged and swallowed by `Destination::send`.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("destination is not connected")]
    NotConnected,

    #[error("queue rejected message: {0}")]
    Client(String),
}
