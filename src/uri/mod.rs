//! URL normalisation
//!
//! Turns the URLs handed over by a dependency resolver into a bucket and key.
//!
//! # Supported forms
//!
//! | Form | Example | Bucket | Key |
//! |------|---------|--------|-----|
//! | Virtual-hosted | `s3://releases.s3.amazonaws.com/a/b.jar` | `releases` | `a/b.jar` |
//! | Regional | `s3://releases.s3-eu-west-1.amazonaws.com/a/b.jar` | `releases` | `a/b.jar` |
//! | Path-style | `https://s3.amazonaws.com/releases/a/b.jar` | `releases` | `a/b.jar` |
//! | Custom domain | `s3://maven.example.com/a/b.jar` | `maven.example.com` | `a/b.jar` |
//!
//! Object stores use their own `s3://` scheme, which generic URL parsers treat
//! as opaque. Every input is therefore rewritten to `https://` before the host
//! is inspected.
//!
//! # Example
//!
//! ```
//! use s3_url_handler::uri::S3Location;
//!
//! let location = S3Location::parse("s3://releases.s3-eu-west-1.amazonaws.com/a/b.jar").unwrap();
//! assert_eq!(location.bucket(), "releases");
//! assert_eq!(location.key(), "a/b.jar");
//! assert_eq!(location.region_hint().as_deref(), Some("eu-west-1"));
//! ```

mod matcher;

pub use matcher::RegionMatcher;

use lazy_static::lazy_static;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use regex_lite::Regex;
use std::net::Ipv4Addr;
use thiserror::Error;
use url::Url;

/// Characters escaped in a listed child name; `/` stays literal
const CHILD_NAME: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

lazy_static! {
    /// Host pattern of S3 endpoints: optional `<bucket>.` prefix, then
    /// `s3.` or `s3-`, then a region (or `amazonaws` for the global endpoint).
    static ref ENDPOINT_PATTERN: Regex = Regex::new(r"^(.+\.)?s3[.-]([a-z0-9-]+)\.").unwrap();
}

/// URL parsing errors
#[derive(Error, Debug)]
pub enum UriError {
    #[error("URL has no host: {0}")]
    MissingHost(String),

    #[error("Malformed URL '{url}': {reason}")]
    Malformed { url: String, reason: String },
}

/// Bucket and key addressed by a single request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BucketRef {
    pub bucket: String,
    pub key: String,
}

impl BucketRef {
    /// Create a new bucket reference
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Prefix used to list the children of this key.
    ///
    /// Trailing slashes are collapsed so the prefix ends with exactly one.
    /// The bucket root lists with the empty prefix.
    pub fn list_prefix(&self) -> String {
        let trimmed = self.key.trim_end_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }
}

/// A resolver URL together with the bucket and key derived from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    url: String,
    bucket_ref: BucketRef,
    endpoint_region: Option<String>,
}

impl S3Location {
    /// Parse a resolver URL.
    ///
    /// Canonical S3 endpoints are parsed strictly; anything else is treated
    /// as a custom domain where the host is the bucket and the path the key.
    pub fn parse(url: &str) -> Result<Self, UriError> {
        let https = parse_as_https(url)?;

        if let Some(strict) = StrictUri::from_url(&https) {
            return Ok(Self {
                url: url.to_string(),
                bucket_ref: BucketRef::new(strict.bucket, strict.key),
                endpoint_region: strict.region,
            });
        }

        let host = https
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| UriError::MissingHost(url.to_string()))?;
        let path = decode_path(https.path());
        let key = path.strip_prefix('/').unwrap_or(&path);

        Ok(Self {
            url: url.to_string(),
            bucket_ref: BucketRef::new(host, key),
            endpoint_region: None,
        })
    }

    /// The URL as given by the caller
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Bucket name
    pub fn bucket(&self) -> &str {
        &self.bucket_ref.bucket
    }

    /// Object key (may be empty for the bucket root)
    pub fn key(&self) -> &str {
        &self.bucket_ref.key
    }

    /// The bucket and key pair
    pub fn bucket_ref(&self) -> &BucketRef {
        &self.bucket_ref
    }

    /// Region embedded in the URL.
    ///
    /// Prefers the region named by a regional S3 endpoint, then any known
    /// region identifier that appears in the URL text.
    pub fn region_hint(&self) -> Option<String> {
        self.endpoint_region
            .clone()
            .or_else(|| RegionMatcher::known().find(&self.url).map(str::to_string))
    }

    /// URL of a listed child key, relative to this location.
    ///
    /// `prefix` is the listing prefix the child was returned under. The
    /// child name is percent-encoded so the URL parses back to `child_key`.
    pub fn child_url(&self, prefix: &str, child_key: &str) -> String {
        let name = child_key.strip_prefix(prefix).unwrap_or(child_key);
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            utf8_percent_encode(name, CHILD_NAME)
        )
    }
}

/// Extract the region hint embedded in a URL, if any.
///
/// Unparseable URLs still get the text scan.
pub fn region_from_url(url: &str) -> Option<String> {
    let strict_region = parse_as_https(url)
        .ok()
        .and_then(|https| StrictUri::from_url(&https))
        .and_then(|strict| strict.region);

    strict_region.or_else(|| RegionMatcher::known().find(url).map(str::to_string))
}

/// Result of the strict S3 endpoint parse
#[derive(Debug, Clone, PartialEq, Eq)]
struct StrictUri {
    bucket: String,
    key: String,
    region: Option<String>,
}

impl StrictUri {
    fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        let captures = ENDPOINT_PATTERN.captures(host)?;

        let region = captures
            .get(2)
            .map(|m| m.as_str())
            .filter(|region| *region != "amazonaws")
            .map(str::to_string);

        let path = decode_path(url.path());
        let path = path.strip_prefix('/').unwrap_or(&path);

        let (bucket, key) = match captures.get(1).map(|m| m.as_str()) {
            Some(prefix) if !prefix.is_empty() => {
                (prefix.strip_suffix('.').unwrap_or(prefix).to_string(), path.to_string())
            }
            _ => match path.split_once('/') {
                Some((bucket, key)) => (bucket.to_string(), key.to_string()),
                None => (path.to_string(), String::new()),
            },
        };

        if !is_valid_bucket_name(&bucket) {
            return None;
        }

        Some(Self {
            bucket,
            key,
            region,
        })
    }
}

/// Rewrite any scheme (or none) to `https` and parse the result.
fn parse_as_https(url: &str) -> Result<Url, UriError> {
    let trimmed = url.trim();
    let rest = match trimmed.split_once("://") {
        Some((scheme, rest)) if is_scheme(scheme) => rest,
        _ => trimmed.trim_start_matches('/'),
    };

    if rest.is_empty() {
        return Err(UriError::MissingHost(url.to_string()));
    }

    Url::parse(&format!("https://{}", rest)).map_err(|e| UriError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn is_scheme(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn decode_path(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// DNS-compatible bucket naming rules
fn is_valid_bucket_name(name: &str) -> bool {
    if !(3..=63).contains(&name.len()) {
        return false;
    }

    let allowed = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-';
    if !name.bytes().all(allowed) {
        return false;
    }

    let bytes = name.as_bytes();
    let edge = |b: u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    if !edge(bytes[0]) || !edge(bytes[bytes.len() - 1]) {
        return false;
    }

    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return false;
    }

    name.parse::<Ipv4Addr>().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_hosted_url() {
        let location =
            S3Location::parse("s3://releases.s3.amazonaws.com/com/example/app/1.0/app-1.0.jar")
                .unwrap();
        assert_eq!(location.bucket(), "releases");
        assert_eq!(location.key(), "com/example/app/1.0/app-1.0.jar");
        assert_eq!(location.region_hint(), None);
    }

    #[test]
    fn test_regional_endpoints() {
        let dash = S3Location::parse("s3://releases.s3-us-west-2.amazonaws.com/a.jar").unwrap();
        assert_eq!(dash.bucket(), "releases");
        assert_eq!(dash.region_hint().as_deref(), Some("us-west-2"));

        let dot = S3Location::parse("https://releases.s3.eu-central-1.amazonaws.com/a.jar").unwrap();
        assert_eq!(dot.bucket(), "releases");
        assert_eq!(dot.key(), "a.jar");
        assert_eq!(dot.region_hint().as_deref(), Some("eu-central-1"));
    }

    #[test]
    fn test_dotted_bucket_virtual_hosted() {
        let location = S3Location::parse("s3://maven.example.s3.amazonaws.com/x/y.pom").unwrap();
        assert_eq!(location.bucket(), "maven.example");
        assert_eq!(location.key(), "x/y.pom");
    }

    #[test]
    fn test_path_style_url() {
        let location = S3Location::parse("https://s3.amazonaws.com/releases/a/b.jar").unwrap();
        assert_eq!(location.bucket(), "releases");
        assert_eq!(location.key(), "a/b.jar");
    }

    #[test]
    fn test_path_style_bucket_only() {
        let location = S3Location::parse("https://s3.amazonaws.com/releases").unwrap();
        assert_eq!(location.bucket(), "releases");
        assert_eq!(location.key(), "");
    }

    #[test]
    fn test_custom_domain_falls_back_to_host() {
        let location = S3Location::parse("s3://maven.example.com/snapshots/a.jar").unwrap();
        assert_eq!(location.bucket(), "maven.example.com");
        assert_eq!(location.key(), "snapshots/a.jar");
    }

    #[test]
    fn test_short_form_bucket_url() {
        let location = S3Location::parse("s3://my-bucket/path/to/key.txt").unwrap();
        assert_eq!(location.bucket(), "my-bucket");
        assert_eq!(location.key(), "path/to/key.txt");
    }

    #[test]
    fn test_url_without_scheme() {
        let location = S3Location::parse("releases.s3.amazonaws.com/a/b.jar").unwrap();
        assert_eq!(location.bucket(), "releases");
        assert_eq!(location.key(), "a/b.jar");
    }

    #[test]
    fn test_invalid_bucket_in_endpoint_falls_back() {
        // Invalid bucket names fail the strict parse, leaving host + path.
        let location = S3Location::parse("https://s3.amazonaws.com/Bad_Bucket/key").unwrap();
        assert_eq!(location.bucket(), "s3.amazonaws.com");
        assert_eq!(location.key(), "Bad_Bucket/key");
    }

    #[test]
    fn test_percent_encoded_key_is_decoded() {
        let location = S3Location::parse("s3://my-bucket/dir/with%20space.txt").unwrap();
        assert_eq!(location.key(), "dir/with space.txt");
    }

    #[test]
    fn test_missing_host() {
        assert!(matches!(
            S3Location::parse("s3://"),
            Err(UriError::MissingHost(_))
        ));
    }

    #[test]
    fn test_list_prefix_normalisation() {
        assert_eq!(BucketRef::new("b", "a/b").list_prefix(), "a/b/");
        assert_eq!(BucketRef::new("b", "a/b/").list_prefix(), "a/b/");
        assert_eq!(BucketRef::new("b", "a/b//").list_prefix(), "a/b/");
        assert_eq!(BucketRef::new("b", "").list_prefix(), "");
    }

    #[test]
    fn test_child_url() {
        let location = S3Location::parse("s3://my-bucket/releases/").unwrap();
        assert_eq!(
            location.child_url("releases/", "releases/app/"),
            "s3://my-bucket/releases/app/"
        );
        assert_eq!(
            location.child_url("releases/", "releases/app.jar"),
            "s3://my-bucket/releases/app.jar"
        );
    }

    #[test]
    fn test_child_url_escapes_reserved_characters() {
        let location = S3Location::parse("s3://releases/libs/").unwrap();
        assert_eq!(
            location.child_url("libs/", "libs/a#1 b.jar"),
            "s3://releases/libs/a%231%20b.jar"
        );

        for key in [
            "libs/a#1.jar",
            "libs/a?v=1.jar",
            "libs/100%41.jar",
            "libs/with space/x.jar",
            "libs/b/c.jar",
        ] {
            let child = S3Location::parse(&location.child_url("libs/", key)).unwrap();
            assert_eq!(child.bucket(), "releases");
            assert_eq!(child.key(), key);
        }
    }

    #[test]
    fn test_region_from_url_text_scan() {
        assert_eq!(
            region_from_url("s3://artifacts-ap-southeast-2/libs/a.jar").as_deref(),
            Some("ap-southeast-2")
        );
        assert_eq!(region_from_url("s3://artifacts/libs/a.jar"), None);
    }

    #[test]
    fn test_bucket_name_rules() {
        assert!(is_valid_bucket_name("my-bucket"));
        assert!(is_valid_bucket_name("my.bucket.01"));
        assert!(!is_valid_bucket_name("ab"));
        assert!(!is_valid_bucket_name("-bucket"));
        assert!(!is_valid_bucket_name("bucket-"));
        assert!(!is_valid_bucket_name("my..bucket"));
        assert!(!is_valid_bucket_name("My-Bucket"));
        assert!(!is_valid_bucket_name("192.168.1.1"));
    }
}
