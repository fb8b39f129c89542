//! Role assumption and SDK-backed credential providers
//!
//! - `RoleAssumer` exchanges base credentials for temporary role credentials
//! - `ExternalCredentials` covers providers owned by the AWS SDK: the shared
//!   profile file and instance metadata

use super::{Credentials, CredentialsError, SourceOutcome};
use async_trait::async_trait;
use aws_config::imds::credentials::ImdsCredentialsProvider;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_config::sts::AssumeRoleProvider;
use aws_config::Region;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use std::fmt;
use tracing::{debug, instrument};

/// Exchanges base credentials for role credentials
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    /// Assume `role_arn` using `base`, returning temporary credentials
    async fn assume_role(
        &self,
        base: &Credentials,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, CredentialsError>;
}

/// STS-backed role assumption
#[derive(Debug, Clone)]
pub struct StsRoleAssumer {
    region: Region,
}

impl StsRoleAssumer {
    /// Create an assumer calling STS in `region`
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: Region::new(region.into()),
        }
    }
}

#[async_trait]
impl RoleAssumer for StsRoleAssumer {
    #[instrument(skip(self, base), fields(sts.region = %self.region))]
    async fn assume_role(
        &self,
        base: &Credentials,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, CredentialsError> {
        let provider = AssumeRoleProvider::builder(role_arn)
            .session_name(session_name)
            .region(self.region.clone())
            .build_from_provider(base.to_sdk())
            .await;

        let assumed = provider
            .provide_credentials()
            .await
            .map_err(|e| CredentialsError::AssumeRole {
                role_arn: role_arn.to_string(),
                message: e.to_string(),
            })?;

        debug!(role_arn = %role_arn, "Role assumed");

        Credentials::from_sdk(&assumed).ok_or_else(|| CredentialsError::AssumeRole {
            role_arn: role_arn.to_string(),
            message: "STS returned incomplete credentials".into(),
        })
    }
}

/// Role assumer that always fails; role sources then skip
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRoleAssumer;

#[async_trait]
impl RoleAssumer for DisabledRoleAssumer {
    async fn assume_role(
        &self,
        _base: &Credentials,
        role_arn: &str,
        _session_name: &str,
    ) -> Result<Credentials, CredentialsError> {
        Err(CredentialsError::AssumeRole {
            role_arn: role_arn.to_string(),
            message: "role assumption disabled".into(),
        })
    }
}

/// A credential provider owned by something other than this crate
#[async_trait]
pub trait ExternalCredentials: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Ask the provider for credentials
    async fn fetch(&self) -> SourceOutcome;
}

/// AWS SDK credential provider adapter
#[derive(Clone)]
pub struct SdkCredentials {
    name: &'static str,
    provider: SharedCredentialsProvider,
}

impl SdkCredentials {
    /// Shared profile file (`~/.aws/credentials`), optionally a named profile
    pub fn profile(profile_name: Option<&str>) -> Self {
        let mut builder = ProfileFileCredentialsProvider::builder();
        if let Some(name) = profile_name {
            builder = builder.profile_name(name);
        }
        Self {
            name: "profile",
            provider: SharedCredentialsProvider::new(builder.build()),
        }
    }

    /// EC2/ECS instance metadata
    pub fn instance_metadata() -> Self {
        Self {
            name: "instance-metadata",
            provider: SharedCredentialsProvider::new(ImdsCredentialsProvider::builder().build()),
        }
    }
}

impl fmt::Debug for SdkCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SdkCredentials")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ExternalCredentials for SdkCredentials {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self) -> SourceOutcome {
        match self.provider.provide_credentials().await {
            Ok(credentials) => match Credentials::from_sdk(&credentials) {
                Some(resolved) => SourceOutcome::Resolved(resolved),
                None => SourceOutcome::skipped(format!("{} returned incomplete credentials", self.name)),
            },
            Err(e) => SourceOutcome::skipped(format!("{}: {}", self.name, e)),
        }
    }
}

/// Provider that never resolves
#[derive(Debug, Clone)]
pub struct Unavailable {
    reason: String,
}

impl Unavailable {
    /// Create a provider that skips with `reason`
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl ExternalCredentials for Unavailable {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn fetch(&self) -> SourceOutcome {
        SourceOutcome::Skipped(self.reason.clone())
    }
}

/// Provider returning fixed credentials
#[derive(Debug, Clone)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Create a provider that always resolves to `credentials`
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl ExternalCredentials for StaticCredentials {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch(&self) -> SourceOutcome {
        SourceOutcome::Resolved(self.credentials.clone())
    }
}
