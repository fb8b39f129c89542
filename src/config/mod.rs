//! Configuration module for the S3 URL handler
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. Every section is optional;
//! an empty file yields the defaults.

use crate::region::lookup_region;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

lazy_static! {
    static ref ENV_VAR_PATTERN: regex_lite::Regex =
        regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
}

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR_PATTERN.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `.s3credentials*` files. Default: `~/.sbt`
    #[serde(default)]
    pub settings_dir: Option<String>,

    /// Profile to read from the shared AWS profile file
    #[serde(default)]
    pub profile: Option<String>,

    /// Process properties (`aws.accessKeyId`, `https.proxyHost`, ...)
    #[serde(default)]
    pub properties: HashMap<String, String>,

    #[serde(default)]
    pub s3: S3Config,

    #[serde(default)]
    pub sts: StsConfig,

    #[serde(default)]
    pub region_lookup: RegionLookupConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Add or override process properties
    pub fn with_properties<I, K, V>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.properties
            .extend(properties.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sts.session_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "STS session name cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid S3 endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        if lookup_region(&self.s3.default_region).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Unknown default region '{}'",
                self.s3.default_region
            )));
        }

        if lookup_region(&self.sts.region).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "Unknown STS region '{}'",
                self.sts.region
            )));
        }

        if let Some(ref dir) = self.settings_dir {
            if dir.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "settings_dir cannot be empty when set".into(),
                ));
            }
        }

        Ok(())
    }
}

/// S3 client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    /// Custom endpoint for S3-compatible stores. Must start with http:// or https://
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Address buckets in the path instead of the host. Default: false
    #[serde(default)]
    pub force_path_style: bool,

    /// Region used when no region is resolved. Default: "us-east-1"
    #[serde(default = "default_region")]
    pub default_region: String,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            force_path_style: false,
            default_region: default_region(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Role assumption configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StsConfig {
    /// Region of the STS endpoint. Default: "us-east-1"
    #[serde(default = "default_region")]
    pub region: String,

    /// Session name for AssumeRole calls. Default: "s3-url-handler"
    #[serde(default = "default_session_name")]
    pub session_name: String,
}

impl Default for StsConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            session_name: default_session_name(),
        }
    }
}

fn default_session_name() -> String {
    crate::credentials::DEFAULT_SESSION_NAME.to_string()
}

/// Which region lookup tiers run after the URL tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionLookupConfig {
    /// Reverse DNS lookup of the bucket host. Default: true
    #[serde(default = "default_true")]
    pub dns: bool,

    /// Bucket location API call. Default: true
    #[serde(default = "default_true")]
    pub service: bool,
}

impl Default for RegionLookupConfig {
    fn default() -> Self {
        Self {
            dns: true,
            service: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-bucket caches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache resolved credentials per bucket. Default: false
    #[serde(default)]
    pub credentials: bool,

    /// Cache resolved regions per bucket. Default: false
    #[serde(default)]
    pub regions: bool,
}
