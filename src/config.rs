//! Adapter configuration, resolved once from a property map.
//!
//! Each numeric key is parsed on its own. A key that is missing or does not
//! parse keeps its default and the failure is logged; it never aborts
//! initialisation. [`Setting`] records which of the two happened, so a
//! zero-worker destination caused by a typo is visible to whoever inspects
//! the config.

use std::{
    collections::HashMap,
    fmt,
    num::{NonZeroU32, ParseIntError},
    str::FromStr,
};

use thiserror::Error;

use crate::{ack::AckStrategy, credentials::CredentialDescriptor};

pub const CONFIG_AWS_REGION: &str = "aws.region";
pub const CONFIG_AWS_SQS_ACCESS_KEY: &str = "aws.sqs.access.key";
pub const CONFIG_AWS_SQS_SECRET_KEY: &str = "aws.sqs.secret.key";
pub const CONFIG_AWS_ROLE_ARN: &str = "aws.sqs.role.arn";
pub const CONFIG_AWS_ROLE_SESSION_NAME: &str = "aws.sqs.role.session.name";
pub const CONFIG_ENDPOINT_URL: &str = "aws.sqs.endpoint.url";
pub const CONFIG_QUEUE_URL: &str = "queue.url";
pub const CONFIG_POLL_INTERVAL: &str = "poll.interval";
pub const CONFIG_THREADS: &str = "consumer.threads";
pub const CONFIG_MAX_MESSAGES: &str = "max.messages";
pub const CONFIG_ACK_STRATEGY: &str = "ack.strategy";

/// Session name used for role assumption when none is configured
pub const DEFAULT_ROLE_SESSION_NAME: &str = "castor";

/// Why a setting fell back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigParseError {
    #[error("`{key}` is not set")]
    Missing { key: &'static str },

    #[error("`{key}` has invalid value {value:?}")]
    InvalidInteger {
        key: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("`{key}` has invalid value {value:?}: expected `always` or `only-on-success`")]
    InvalidAckStrategy { key: &'static str, value: String },
}

/// A resolved configuration value that remembers where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting<T> {
    /// The property was present and parsed
    Explicit(T),
    /// The property was missing or unparsable; the default applies
    Defaulted(T, ConfigParseError),
}

impl<T: Copy> Setting<T> {
    pub fn value(&self) -> T {
        match self {
            Setting::Explicit(value) | Setting::Defaulted(value, _) => *value,
        }
    }
}

impl<T> Setting<T> {
    pub fn is_explicit(&self) -> bool {
        matches!(self, Setting::Explicit(_))
    }

    /// The reason the default was used, if it was
    pub fn default_cause(&self) -> Option<&ConfigParseError> {
        match self {
            Setting::Explicit(_) => None,
            Setting::Defaulted(_, cause) => Some(cause),
        }
    }
}

/// Immutable snapshot of everything a destination needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Target queue URL
    pub queue_url: String,
    /// Number of worker loops created by `bind`
    ///
    /// Default: 0 (no workers ever run)
    pub worker_count: Setting<u32>,
    /// Long-poll wait per receive call, in seconds
    ///
    /// Default: 0 (non-blocking polls)
    pub poll_interval: Setting<u32>,
    /// Maximum messages per receive call
    ///
    /// Accepted but not applied: workers always receive one message per call.
    /// Default: 1
    pub max_messages: Setting<NonZeroU32>,
    /// AWS region of the queue
    pub region: Option<String>,
    /// Endpoint override, e.g. for LocalStack or ElasticMQ
    pub endpoint_url: Option<String>,
    /// How to obtain credentials for the queue client
    pub credentials: CredentialDescriptor,
    /// When workers acknowledge a message
    ///
    /// Default: [`AckStrategy::Always`]
    pub ack_strategy: Setting<AckStrategy>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::from_properties(&HashMap::new())
    }
}

impl AdapterConfig {
    /// Resolve the configuration from a property map.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let get = |key: &str| {
            properties
                .get(key)
                .map(|value| value.trim())
                .filter(|value| !value.is_empty())
        };

        let queue_url = get(CONFIG_QUEUE_URL).unwrap_or_default().to_string();
        if queue_url.is_empty() {
            tracing::warn!(key = CONFIG_QUEUE_URL, "queue url is not configured");
        }

        let worker_count = parse_setting(CONFIG_THREADS, get(CONFIG_THREADS), 0, |raw| {
            raw.parse::<u32>()
        });
        let poll_interval =
            parse_setting(CONFIG_POLL_INTERVAL, get(CONFIG_POLL_INTERVAL), 0, |raw| {
                raw.parse::<u32>()
            });
        let max_messages = parse_setting(
            CONFIG_MAX_MESSAGES,
            get(CONFIG_MAX_MESSAGES),
            NonZeroU32::MIN,
            NonZeroU32::from_str,
        );

        let ack_strategy = match get(CONFIG_ACK_STRATEGY) {
            None => Setting::Defaulted(
                AckStrategy::default(),
                ConfigParseError::Missing {
                    key: CONFIG_ACK_STRATEGY,
                },
            ),
            Some(raw) => match AckStrategy::from_name(raw) {
                Some(strategy) => Setting::Explicit(strategy),
                None => {
                    let error = ConfigParseError::InvalidAckStrategy {
                        key: CONFIG_ACK_STRATEGY,
                        value: raw.to_string(),
                    };
                    tracing::error!(error = %error, "unable to parse acknowledgment strategy, using default");
                    Setting::Defaulted(AckStrategy::default(), error)
                }
            },
        };

        let credentials = CredentialDescriptor::from_parts(
            get(CONFIG_AWS_SQS_ACCESS_KEY),
            get(CONFIG_AWS_SQS_SECRET_KEY),
            get(CONFIG_AWS_ROLE_ARN),
            get(CONFIG_AWS_ROLE_SESSION_NAME).unwrap_or(DEFAULT_ROLE_SESSION_NAME),
        );

        let config = Self {
            queue_url,
            worker_count,
            poll_interval,
            max_messages,
            region: get(CONFIG_AWS_REGION).map(str::to_string),
            endpoint_url: get(CONFIG_ENDPOINT_URL).map(str::to_string),
            credentials,
            ack_strategy,
        };

        if config.max_messages.value() != NonZeroU32::MIN {
            tracing::warn!(
                max_messages = config.max_messages.value().get(),
                "max messages is accepted but receive calls always fetch a single message"
            );
        }

        config
    }

    pub fn worker_count(&self) -> u32 {
        self.worker_count.value()
    }

    pub fn poll_interval(&self) -> u32 {
        self.poll_interval.value()
    }

    pub fn max_messages(&self) -> NonZeroU32 {
        self.max_messages.value()
    }

    pub fn ack_strategy(&self) -> AckStrategy {
        self.ack_strategy.value()
    }
}

fn parse_setting<T, F>(key: &'static str, raw: Option<&str>, default: T, parse: F) -> Setting<T>
where
    T: fmt::Debug,
    F: FnOnce(&str) -> Result<T, ParseIntError>,
{
    let Some(raw) = raw else {
        tracing::warn!(key, default = ?default, "property not set, using default");
        return Setting::Defaulted(default, ConfigParseError::Missing { key });
    };

    match parse(raw) {
        Ok(value) => Setting::Explicit(value),
        Err(source) => {
            let error = ConfigParseError::InvalidInteger {
                key,
                value: raw.to_string(),
                source,
            };
            tracing::error!(error = %error, default = ?default, "unable to parse property, using default");
            Setting::Defaulted(default, error)
        }
    }
}
