//! Provider chain
//!
//! Orders the credential sources for one bucket and returns the first
//! resolution. Role-assumption variants come first, then the basic sources.

use super::source::{CredentialSource, Scope};
use super::{CredentialServices, Credentials, CredentialsError, SourceOutcome};
use crate::metrics;
use tracing::{debug, instrument};

/// Global settings file name
pub const GLOBAL_CREDENTIALS_FILE: &str = ".s3credentials";

/// Ordered credential sources for one bucket
#[derive(Debug, Clone)]
pub struct ProviderChain {
    bucket: String,
    sources: Vec<CredentialSource>,
}

impl ProviderChain {
    /// The full chain for `bucket`: role variants, then basic sources
    pub fn for_bucket(bucket: impl Into<String>) -> Self {
        let bucket = bucket.into();
        let mut sources = role_sources(&bucket);
        sources.extend(basic_sources(&bucket));
        Self { bucket, sources }
    }

    /// A chain over an explicit list of sources
    pub fn with_sources(bucket: impl Into<String>, sources: Vec<CredentialSource>) -> Self {
        Self {
            bucket: bucket.into(),
            sources,
        }
    }

    /// Bucket this chain was built for
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Sources in lookup order
    pub fn sources(&self) -> &[CredentialSource] {
        &self.sources
    }

    /// Resolve credentials, failing only when every source skipped
    #[instrument(skip(self, services), fields(s3.bucket = %self.bucket))]
    pub async fn resolve(
        &self,
        services: &CredentialServices,
    ) -> Result<Credentials, CredentialsError> {
        for source in &self.sources {
            match source.lookup(services).await {
                SourceOutcome::Resolved(credentials) => {
                    debug!(source = %source, "Credentials resolved");
                    metrics::record_credential_resolution(source.metric_label());
                    return Ok(credentials);
                }
                SourceOutcome::Skipped(reason) => {
                    debug!(source = %source, reason = %reason, "Credential source skipped");
                }
            }
        }

        metrics::record_credential_resolution("none");
        Err(CredentialsError::Unavailable {
            bucket: self.bucket.clone(),
            tried: self.sources.iter().map(|s| s.to_string()).collect(),
        })
    }
}

/// The nine basic sources for `bucket`, in lookup order
pub fn basic_sources(bucket: &str) -> Vec<CredentialSource> {
    let scope = Scope::Bucket(bucket.to_string());
    vec![
        CredentialSource::Environment(scope.clone()),
        CredentialSource::Properties(scope),
        CredentialSource::SettingsFile(format!("{}_{}", GLOBAL_CREDENTIALS_FILE, bucket)),
        CredentialSource::SettingsFile(format!(".{}_s3credentials", bucket)),
        CredentialSource::Environment(Scope::Global),
        CredentialSource::Properties(Scope::Global),
        CredentialSource::Profile,
        CredentialSource::SettingsFile(GLOBAL_CREDENTIALS_FILE.to_string()),
        CredentialSource::InstanceMetadata,
    ]
}

/// Role variants of every basic source that can carry a role ARN
pub fn role_sources(bucket: &str) -> Vec<CredentialSource> {
    basic_sources(bucket)
        .into_iter()
        .filter(|source| {
            !matches!(
                source,
                CredentialSource::Profile | CredentialSource::InstanceMetadata
            )
        })
        .map(|source| CredentialSource::assume_role(source, bucket))
        .collect()
}

/// First basic source that resolves, with the source that did.
///
/// Role variants in `sources` never resolve here.
pub(crate) async fn first_resolved<'a>(
    sources: &'a [CredentialSource],
    services: &CredentialServices,
) -> Option<(Credentials, &'a CredentialSource)> {
    for source in sources {
        match source.lookup_basic(services).await {
            SourceOutcome::Resolved(credentials) => return Some((credentials, source)),
            SourceOutcome::Skipped(reason) => {
                debug!(source = %source, reason = %reason, "Base credential source skipped");
            }
        }
    }
    None
}
