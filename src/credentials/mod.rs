//! S3 Credentials Module
//!
//! Resolves the credentials used for a bucket by walking an ordered chain of
//! credential sources.
//!
//! # Design
//!
//! - `CredentialSource` is a tagged variant, one per lookup strategy
//! - Each lookup yields a `SourceOutcome`: resolved, or skipped with a reason
//! - `ProviderChain` tries sources in order; the first resolution wins
//! - Role-assumption sources wrap a basic source and run before all basic ones
//!
//! # Chain order
//!
//! | # | Source |
//! |---|--------|
//! | 1-7 | Role assumption over sources 8, 9, 10, 11, 12, 13 and 15 |
//! | 8 | Bucket-specific environment variables |
//! | 9 | Bucket-specific process properties |
//! | 10 | `.s3credentials_<bucket>` settings file |
//! | 11 | `.<bucket>_s3credentials` settings file |
//! | 12 | Global environment variables |
//! | 13 | Global process properties |
//! | 14 | Shared profile file |
//! | 15 | `.s3credentials` settings file |
//! | 16 | Instance metadata |
//!
//! # Example
//!
//! ```
//! use s3_url_handler::credentials::{Credentials, CredentialServices, ProviderChain};
//! use s3_url_handler::credentials::role::DisabledRoleAssumer;
//! use s3_url_handler::env::MemoryEnvironment;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let env = MemoryEnvironment::new()
//!     .with_var("AWS_ACCESS_KEY_ID_RELEASES", "AKIDRELEASES")
//!     .with_var("AWS_SECRET_KEY_RELEASES", "secret");
//! let services = CredentialServices::new(Arc::new(env), Arc::new(DisabledRoleAssumer));
//!
//! let creds = ProviderChain::for_bucket("releases").resolve(&services).await?;
//! assert_eq!(creds.access_key_id(), "AKIDRELEASES");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod chain;
pub mod naming;
pub mod properties;
pub mod role;
pub mod source;

pub use cache::CredentialsCache;
pub use chain::ProviderChain;
pub use role::{ExternalCredentials, RoleAssumer};
pub use source::{CredentialSource, Scope};

use crate::env::Environment;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;

/// Session name used for AssumeRole calls unless configured otherwise
pub const DEFAULT_SESSION_NAME: &str = "s3-url-handler";

/// Provider name reported to the AWS SDK for credentials resolved here
const SDK_PROVIDER_NAME: &str = "s3-url-handler";

/// Credential resolution errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("No credentials available for bucket '{bucket}' (tried: {})", .tried.join(", "))]
    Unavailable { bucket: String, tried: Vec<String> },

    #[error("AssumeRole failed for '{role_arn}': {message}")]
    AssumeRole { role_arn: String, message: String },

    #[error("Credential provider error: {0}")]
    Provider(String),
}

/// Credentials for AWS authentication
///
/// Always complete: both keys are non-empty. Temporary credentials also
/// carry a session token and usually an expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
    expires_at: Option<SystemTime>,
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
            expires_at: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
            expires_at: None,
        }
    }

    /// Build credentials only if both keys are present and non-empty.
    ///
    /// A blank session token is dropped.
    pub fn complete(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        session_token: Option<String>,
    ) -> Option<Self> {
        let access_key_id = access_key_id.filter(|v| !v.trim().is_empty())?;
        let secret_access_key = secret_access_key.filter(|v| !v.trim().is_empty())?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: session_token.filter(|v| !v.trim().is_empty()),
            expires_at: None,
        })
    }

    /// Set the expiry time
    pub fn expiring_at(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Get the access key ID
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// Get the secret access key
    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    /// Get the session token (if any)
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Get the expiry time (if any)
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Whether the credentials have an expiry in the past
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .map(|at| at <= SystemTime::now())
            .unwrap_or(false)
    }

    /// Convert from AWS SDK credentials, rejecting incomplete ones
    pub fn from_sdk(credentials: &aws_credential_types::Credentials) -> Option<Self> {
        let resolved = Self::complete(
            Some(credentials.access_key_id().to_string()),
            Some(credentials.secret_access_key().to_string()),
            credentials.session_token().map(str::to_string),
        )?;
        Some(match credentials.expiry() {
            Some(expiry) => resolved.expiring_at(expiry),
            None => resolved,
        })
    }

    /// Convert into AWS SDK credentials
    pub fn to_sdk(&self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
            self.expires_at,
            SDK_PROVIDER_NAME,
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "** redacted **"),
            )
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Result of asking a single source for credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// The source produced complete credentials
    Resolved(Credentials),
    /// The source cannot provide credentials; the chain moves on
    Skipped(String),
}

impl SourceOutcome {
    /// Skip with a reason
    pub fn skipped(reason: impl Into<String>) -> Self {
        SourceOutcome::Skipped(reason.into())
    }

    /// Resolved if complete, skipped otherwise.
    ///
    /// A lone access key or secret is reported as incomplete, never returned.
    pub fn from_parts(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        session_token: Option<String>,
    ) -> Self {
        match (&access_key_id, &secret_access_key) {
            (None, None) => SourceOutcome::skipped("no access key or secret key set"),
            (Some(_), None) => SourceOutcome::skipped("access key set without secret key"),
            (None, Some(_)) => SourceOutcome::skipped("secret key set without access key"),
            (Some(_), Some(_)) => {
                match Credentials::complete(access_key_id, secret_access_key, session_token) {
                    Some(credentials) => SourceOutcome::Resolved(credentials),
                    None => SourceOutcome::skipped("blank access key or secret key"),
                }
            }
        }
    }
}

/// Collaborators the credential sources rely on
#[derive(Clone)]
pub struct CredentialServices {
    pub environment: Arc<dyn Environment>,
    pub role_assumer: Arc<dyn RoleAssumer>,
    pub profile: Arc<dyn ExternalCredentials>,
    pub instance_metadata: Arc<dyn ExternalCredentials>,
    pub session_name: String,
}

impl CredentialServices {
    /// Create services with profile and instance-metadata lookups disabled
    pub fn new(environment: Arc<dyn Environment>, role_assumer: Arc<dyn RoleAssumer>) -> Self {
        Self {
            environment,
            role_assumer,
            profile: Arc::new(role::Unavailable::new("profile lookup disabled")),
            instance_metadata: Arc::new(role::Unavailable::new(
                "instance metadata lookup disabled",
            )),
            session_name: DEFAULT_SESSION_NAME.to_string(),
        }
    }

    /// Use the given profile-file provider
    pub fn with_profile(mut self, profile: Arc<dyn ExternalCredentials>) -> Self {
        self.profile = profile;
        self
    }

    /// Use the given instance-metadata provider
    pub fn with_instance_metadata(mut self, instance_metadata: Arc<dyn ExternalCredentials>) -> Self {
        self.instance_metadata = instance_metadata;
        self
    }

    /// Use a custom AssumeRole session name
    pub fn with_session_name(mut self, session_name: impl Into<String>) -> Self {
        self.session_name = session_name.into();
        self
    }
}

impl fmt::Debug for CredentialServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialServices")
            .field("environment", &self.environment)
            .field("session_name", &self.session_name)
            .finish_non_exhaustive()
    }
}
