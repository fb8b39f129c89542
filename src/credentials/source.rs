//! Credential sources
//!
//! One variant per lookup strategy. Role assumption wraps a basic source,
//! reads the role ARN the way that source reads keys, and assumes the role
//! with credentials from the basic chain.

use super::chain::{basic_sources, first_resolved};
use super::naming::{self, candidates, env_candidates};
use super::properties::Properties;
use super::{CredentialServices, SourceOutcome};
use crate::env::Environment;
use std::fmt;
use tracing::debug;

/// Whether a source reads global or bucket-qualified names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Bucket(String),
}

/// A single credential lookup strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// Environment variables
    Environment(Scope),
    /// Process properties
    Properties(Scope),
    /// Properties file in the settings directory
    SettingsFile(String),
    /// Shared AWS profile file
    Profile,
    /// EC2/ECS instance metadata
    InstanceMetadata,
    /// Role assumption keyed by the wrapped source's role ARN
    AssumeRole {
        arn_source: Box<CredentialSource>,
        bucket: String,
    },
}

impl CredentialSource {
    /// Wrap a basic source into its role-assumption variant
    pub fn assume_role(arn_source: CredentialSource, bucket: impl Into<String>) -> Self {
        CredentialSource::AssumeRole {
            arn_source: Box::new(arn_source),
            bucket: bucket.into(),
        }
    }

    /// Whether this is a role-assumption source
    pub fn is_role(&self) -> bool {
        matches!(self, CredentialSource::AssumeRole { .. })
    }

    /// Low-cardinality label for metrics
    pub fn metric_label(&self) -> &'static str {
        match self {
            CredentialSource::Environment(Scope::Bucket(_)) => "bucket_env",
            CredentialSource::Environment(Scope::Global) => "env",
            CredentialSource::Properties(Scope::Bucket(_)) => "bucket_properties",
            CredentialSource::Properties(Scope::Global) => "properties",
            CredentialSource::SettingsFile(_) => "settings_file",
            CredentialSource::Profile => "profile",
            CredentialSource::InstanceMetadata => "instance_metadata",
            CredentialSource::AssumeRole { .. } => "assume_role",
        }
    }

    /// Role ARN configured for this source, if the source can carry one
    pub fn role_arn(&self, env: &dyn Environment) -> Option<String> {
        match self {
            CredentialSource::Environment(scope) => {
                first_var(env, &env_candidates(naming::ENV_ROLE_ARN, scope))
            }
            CredentialSource::Properties(scope) => {
                first_property(env, &candidates(naming::PROPERTY_ROLE_ARN, scope))
            }
            CredentialSource::SettingsFile(file_name) => read_properties(env, file_name)
                .and_then(|props| props.first_of(&file_keys(naming::FILE_ROLE_ARN))),
            CredentialSource::Profile
            | CredentialSource::InstanceMetadata
            | CredentialSource::AssumeRole { .. } => None,
        }
    }

    /// Ask this source for credentials
    pub async fn lookup(&self, services: &CredentialServices) -> SourceOutcome {
        match self {
            CredentialSource::AssumeRole { arn_source, bucket } => {
                let Some(role_arn) = arn_source.role_arn(services.environment.as_ref()) else {
                    return SourceOutcome::skipped("no role ARN configured");
                };

                let base = match first_resolved(&basic_sources(bucket), services).await {
                    Some((base, _)) => base,
                    None => {
                        return SourceOutcome::skipped(format!(
                            "no base credentials to assume {}",
                            role_arn
                        ))
                    }
                };

                match services
                    .role_assumer
                    .assume_role(&base, &role_arn, &services.session_name)
                    .await
                {
                    Ok(assumed) => SourceOutcome::Resolved(assumed),
                    Err(e) => SourceOutcome::skipped(e.to_string()),
                }
            }
            basic => basic.lookup_basic(services).await,
        }
    }

    /// Lookup for every non-role source
    pub(crate) async fn lookup_basic(&self, services: &CredentialServices) -> SourceOutcome {
        let env = services.environment.as_ref();
        match self {
            CredentialSource::Environment(scope) => {
                let access_names = match scope {
                    Scope::Global => naming::GLOBAL_ENV_ACCESS_KEY,
                    Scope::Bucket(_) => naming::ENV_ACCESS_KEY,
                };
                SourceOutcome::from_parts(
                    first_var(env, &env_candidates(access_names, scope)),
                    first_var(env, &env_candidates(naming::ENV_SECRET_KEY, scope)),
                    first_var(env, &env_candidates(naming::ENV_SESSION_TOKEN, scope)),
                )
            }
            CredentialSource::Properties(scope) => SourceOutcome::from_parts(
                first_property(env, &candidates(naming::PROPERTY_ACCESS_KEY, scope)),
                first_property(env, &candidates(naming::PROPERTY_SECRET_KEY, scope)),
                first_property(env, &candidates(naming::PROPERTY_SESSION_TOKEN, scope)),
            ),
            CredentialSource::SettingsFile(file_name) => match read_properties(env, file_name) {
                Some(props) => SourceOutcome::from_parts(
                    props.first_of(&file_keys(naming::FILE_ACCESS_KEY)),
                    props.first_of(&file_keys(naming::FILE_SECRET_KEY)),
                    None,
                ),
                None => SourceOutcome::skipped(format!("{} not found", file_name)),
            },
            CredentialSource::Profile => services.profile.fetch().await,
            CredentialSource::InstanceMetadata => services.instance_metadata.fetch().await,
            CredentialSource::AssumeRole { .. } => {
                SourceOutcome::skipped("role assumption cannot provide base credentials")
            }
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Environment(Scope::Global) => write!(f, "env"),
            CredentialSource::Environment(Scope::Bucket(b)) => write!(f, "env({})", b),
            CredentialSource::Properties(Scope::Global) => write!(f, "properties"),
            CredentialSource::Properties(Scope::Bucket(b)) => write!(f, "properties({})", b),
            CredentialSource::SettingsFile(name) => write!(f, "file({})", name),
            CredentialSource::Profile => write!(f, "profile"),
            CredentialSource::InstanceMetadata => write!(f, "instance-metadata"),
            CredentialSource::AssumeRole { arn_source, .. } => {
                write!(f, "assume-role[{}]", arn_source)
            }
        }
    }
}

fn first_var(env: &dyn Environment, names: &[String]) -> Option<String> {
    names.iter().find_map(|name| env.var(name))
}

fn first_property(env: &dyn Environment, names: &[String]) -> Option<String> {
    names.iter().find_map(|name| env.property(name))
}

fn file_keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn read_properties(env: &dyn Environment, file_name: &str) -> Option<Properties> {
    match env.read_settings_file(file_name) {
        Ok(content) => content.map(|c| Properties::parse(&c)),
        Err(e) => {
            debug!(file = %file_name, error = %e, "Unreadable credential file");
            None
        }
    }
}
