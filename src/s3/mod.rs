//! S3 Client module
//!
//! Object-store access used by the URL handler.
//!
//! # Design
//!
//! - `ObjectStore` is the store seen by the handler: head, get, list, put and
//!   bucket location
//! - `ClientFactory` builds a fresh `ObjectStore` for each operation from the
//!   resolved credentials, region and proxy
//! - `AwsObjectStore` is the `aws-sdk-s3` implementation
//!
//! # Tracing
//!
//! `AwsObjectStore` operations are instrumented:
//!
//! | Operation | Span Name | Attributes |
//! |-----------|-----------|------------|
//! | HeadObject | `s3.head_object` | bucket, key, status_code |
//! | GetObject | `s3.get_object` | bucket, key, bytes, status_code |
//! | ListObjectsV2 | `s3.list_objects` | bucket, prefix, delimiter, count |
//! | PutObject | `s3.put_object` | bucket, key, bytes, etag |
//! | GetBucketLocation | `s3.get_bucket_location` | bucket |

pub mod client;
pub mod proxy;

pub use client::{AwsClientFactory, AwsObjectStore};
pub use proxy::{ProxyConfig, ProxyHttpClient};

use crate::credentials::Credentials;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Object store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Not-found error for `bucket`/`key`
    pub fn not_found(bucket: &str, key: &str) -> Self {
        StoreError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Whether this error means the object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Object metadata returned by head and get
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub content_length: u64,
    pub last_modified: Option<SystemTime>,
    pub etag: Option<String>,
}

/// Streamed object body, owned by the caller
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Object body with its metadata
pub struct ObjectContent {
    pub metadata: ObjectMetadata,
    pub body: ObjectReader,
}

impl fmt::Debug for ObjectContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectContent")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// One page of a delimited listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// Rolled-up "directory" prefixes, each ending with the delimiter
    pub common_prefixes: Vec<String>,
    /// Object keys directly under the prefix
    pub keys: Vec<String>,
    /// More results exist beyond this page
    pub truncated: bool,
}

/// Result of an upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutcome {
    pub etag: Option<String>,
    pub bytes: u64,
}

/// The object store as seen by the URL handler
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Metadata of `bucket`/`key`
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError>;

    /// Body and metadata of `bucket`/`key`
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, StoreError>;

    /// First page of keys under `prefix`, rolled up at `delimiter`
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<ObjectListing, StoreError>;

    /// Upload the file at `source` to `bucket`/`key`
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<PutObjectOutcome, StoreError>;

    /// Raw location constraint of `bucket` (`None` or empty for the default region)
    async fn bucket_location(&self, bucket: &str) -> Result<Option<String>, StoreError>;
}

/// Builds store clients for one operation
pub trait ClientFactory: Send + Sync {
    /// Build a client using `credentials`, in `region` if known, through `proxy` if set
    fn build(
        &self,
        credentials: &Credentials,
        region: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn ObjectStore>, StoreError>;
}
