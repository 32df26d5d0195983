//! Mapping between queue-native messages and the events handed to a processor.

use crate::error::{DecodeError, EncodeError};

/// An event as seen by the event processor.
///
/// The same shape is used for inbound delivery and outbound publication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    /// Raw payload bytes
    pub payload: Vec<u8>,
    /// Queue-assigned identifier of the message the event came from
    pub ext_id: String,
}

impl Event {
    /// Create a new event
    pub fn new(payload: impl Into<Vec<u8>>, ext_id: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            ext_id: ext_id.into(),
        }
    }
}

/// A message in the queue's own representation.
///
/// `receipt_handle` is the acknowledgment token returned by a receive call; it
/// is what `delete` needs, not the message id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireMessage {
    pub message_id: Option<String>,
    pub body: Option<String>,
    pub receipt_handle: Option<String>,
}

impl WireMessage {
    /// Create a new message with a body and message id, but no receipt handle
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            body: Some(body.into()),
            receipt_handle: None,
        }
    }

    /// Attach a receipt handle (builder pattern)
    pub fn with_receipt_handle(mut self, receipt_handle: impl Into<String>) -> Self {
        self.receipt_handle = Some(receipt_handle.into());
        self
    }
}

impl From<aws_sdk_sqs::types::Message> for WireMessage {
    fn from(message: aws_sdk_sqs::types::Message) -> Self {
        Self {
            message_id: message.message_id,
            body: message.body,
            receipt_handle: message.receipt_handle,
        }
    }
}

/// Bidirectional mapping between [`WireMessage`] and [`Event`].
///
/// `decode` returns `Ok(None)` when the message is not something this codec
/// handles. Workers skip processing for such messages but still run the
/// acknowledgment step.
///
/// `Destination::send` runs `encode` and logs a failure, but always publishes
/// the event's raw payload as the message body.
pub trait Codec: Send + Sync + 'static {
    fn decode(&self, message: &WireMessage) -> Result<Option<Event>, DecodeError>;

    fn encode(&self, event: &Event) -> Result<WireMessage, EncodeError>;
}

/// Plain text codec: body <-> payload, message id <-> external id.
///
/// Decoding never declines a message; a missing id becomes an empty external
/// id. Encoding reads the payload as text, replacing invalid UTF-8.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl Codec for TextCodec {
    fn decode(&self, message: &WireMessage) -> Result<Option<Event>, DecodeError> {
        tracing::debug!(message_id = ?message.message_id, "decoding queue message");

        let ext_id = message.message_id.clone().unwrap_or_default();
        let payload = message
            .body
            .as_ref()
            .map(|body| body.as_bytes().to_vec())
            .unwrap_or_default();

        Ok(Some(Event { payload, ext_id }))
    }

    fn encode(&self, event: &Event) -> Result<WireMessage, EncodeError> {
        tracing::debug!(ext_id = %event.ext_id, "encoding event");

        Ok(WireMessage {
            message_id: Some(event.ext_id.clone()),
            body: Some(String::from_utf8_lossy(&event.payload).into_owned()),
            receipt_handle: None,
        })
    }
}
