//! Deciding whether a received message gets deleted from the queue.

/// What happened to a single received message before the acknowledgment step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The event was decoded and the processor returned `Ok`
    Processed,
    /// The codec declined the message, so the processor was not invoked
    Skipped,
    /// The codec returned an error
    DecodeFailed,
    /// The processor returned an error or panicked
    ProcessingFailed,
}

impl DeliveryOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, DeliveryOutcome::Processed | DeliveryOutcome::Skipped)
    }
}

/// Capability that decides, per message, whether the worker deletes it.
pub trait AckPolicy: Send + Sync + 'static {
    fn should_acknowledge(&self, outcome: DeliveryOutcome) -> bool;
}

/// The built-in acknowledgment policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AckStrategy {
    /// Delete every received message, whatever happened to it.
    ///
    /// From the processor's point of view delivery is at-most-once: a message
    /// whose processing failed is gone.
    #[default]
    Always,
    /// Delete only messages that were processed or deliberately skipped.
    ///
    /// Failed messages become visible again once the queue's visibility
    /// timeout expires.
    OnlyOnSuccess,
}

impl AckStrategy {
    /// Parse a strategy from its configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "always" => Some(AckStrategy::Always),
            "only-on-success" | "only_on_success" => Some(AckStrategy::OnlyOnSuccess),
            _ => None,
        }
    }
}

impl AckPolicy for AckStrategy {
    fn should_acknowledge(&self, outcome: DeliveryOutcome) -> bool {
        match self {
            AckStrategy::Always => true,
            AckStrategy::OnlyOnSuccess => outcome.is_success(),
        }
    }
}
