//! Credential resolution for the queue client.
//!
//! Credentials are resolved once per `connect()`. Temporary credentials from a
//! role assumption are not refreshed in the background: they stay fixed for the
//! lifetime of the client built from them, and a fresh `connect()` is the only
//! way to renew them.

use std::{fmt, time::Duration, time::SystemTime};

use aws_config::{BehaviorVersion, Region, sts::AssumeRoleProvider};
use aws_credential_types::{
    Credentials,
    provider::{ProvideCredentials, SharedCredentialsProvider, error::CredentialsError},
};
use thiserror::Error;

/// Lifetime requested for assumed-role sessions
pub const ROLE_SESSION_DURATION: Duration = Duration::from_secs(3600);

const PROVIDER_NAME: &str = "castor";

/// Long-lived access key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticKeys {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeys")
            .field("access_key", &self.access_key)
            .field("secret_key", &"** redacted **")
            .finish()
    }
}

/// Where the queue client's credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialDescriptor {
    /// Environment, profile, or instance metadata
    DefaultChain,
    /// Static keys used as-is
    Static(StaticKeys),
    /// Exchange base credentials for a temporary session scoped to a role.
    ///
    /// With no static keys the default chain provides the base credentials.
    AssumeRole {
        role_arn: String,
        session_name: String,
        base: Option<StaticKeys>,
    },
}

impl CredentialDescriptor {
    /// Build a descriptor from optional raw property values.
    pub fn from_parts(
        access_key: Option<&str>,
        secret_key: Option<&str>,
        role_arn: Option<&str>,
        session_name: &str,
    ) -> Self {
        let keys = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Some(StaticKeys {
                access_key: access_key.to_string(),
                secret_key: secret_key.to_string(),
            }),
            (None, None) => None,
            _ => {
                tracing::warn!("only one of access key and secret key is set, ignoring both");
                None
            }
        };

        match (role_arn, keys) {
            (Some(role_arn), base) => CredentialDescriptor::AssumeRole {
                role_arn: role_arn.to_string(),
                session_name: session_name.to_string(),
                base,
            },
            (None, Some(keys)) => CredentialDescriptor::Static(keys),
            (None, None) => CredentialDescriptor::DefaultChain,
        }
    }
}

/// Credentials handed to the queue client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expires_at: Option<SystemTime>,
}

impl fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl From<Credentials> for SessionCredentials {
    fn from(credentials: Credentials) -> Self {
        Self {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().map(str::to_string),
            expires_at: credentials.expiry(),
        }
    }
}

impl From<SessionCredentials> for Credentials {
    fn from(session: SessionCredentials) -> Self {
        Credentials::new(
            session.access_key_id,
            session.secret_access_key,
            session.session_token,
            session.expires_at,
            PROVIDER_NAME,
        )
    }
}

impl From<&StaticKeys> for Credentials {
    fn from(keys: &StaticKeys) -> Self {
        Credentials::new(
            keys.access_key.clone(),
            keys.secret_key.clone(),
            None,
            None,
            PROVIDER_NAME,
        )
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials provider found in the default chain")]
    NoProvider,

    #[error("default credentials chain failed")]
    Provider(#[source] CredentialsError),

    #[error("failed to assume role {role_arn}")]
    AssumeRole {
        role_arn: String,
        #[source]
        source: CredentialsError,
    },
}

/// Resolve a descriptor into a fixed set of credentials.
pub async fn resolve_credentials(
    descriptor: &CredentialDescriptor,
    region: Option<&str>,
) -> Result<SessionCredentials, CredentialError> {
    tracing::debug!("establishing AWS credentials");

    let credentials = match descriptor {
        CredentialDescriptor::Static(keys) => SessionCredentials::from(Credentials::from(keys)),
        CredentialDescriptor::DefaultChain => {
            let provider = default_chain(region).await?;
            let credentials = provider
                .provide_credentials()
                .await
                .map_err(CredentialError::Provider)?;
            SessionCredentials::from(credentials)
        }
        CredentialDescriptor::AssumeRole {
            role_arn,
            session_name,
            base,
        } => {
            let base = match base {
                Some(keys) => SharedCredentialsProvider::new(Credentials::from(keys)),
                None => default_chain(region).await?,
            };

            let mut builder = AssumeRoleProvider::builder(role_arn.clone())
                .session_name(session_name.clone())
                .session_length(ROLE_SESSION_DURATION);
            if let Some(region) = region {
                builder = builder.region(Region::new(region.to_string()));
            }

            let provider = builder.build_from_provider(base).await;
            let credentials = provider.provide_credentials().await.map_err(|source| {
                CredentialError::AssumeRole {
                    role_arn: role_arn.clone(),
                    source,
                }
            })?;
            SessionCredentials::from(credentials)
        }
    };

    tracing::debug!("credentials established");

    Ok(credentials)
}

async fn default_chain(region: Option<&str>) -> Result<SharedCredentialsProvider, CredentialError> {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }

    loader
        .load()
        .await
        .credentials_provider()
        .ok_or(CredentialError::NoProvider)
}
