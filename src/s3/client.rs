//! AWS SDK object store
//!
//! `AwsObjectStore` wraps an `aws-sdk-s3` client; `AwsClientFactory` builds
//! one per operation with static credentials, the resolved region, and the
//! optional endpoint override and proxy.

use super::proxy::{ProxyConfig, ProxyHttpClient};
use super::{
    ClientFactory, ObjectContent, ObjectListing, ObjectMetadata, ObjectStore, PutObjectOutcome,
    StoreError,
};
use crate::config::S3Config;
use crate::credentials::Credentials;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Region, RequestChecksumCalculation};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::error::display::DisplayErrorContext;
use std::error::Error as StdError;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Region used when none has been resolved
pub const DEFAULT_REGION: &str = "us-east-1";

/// `ObjectStore` backed by `aws-sdk-s3`
#[derive(Debug, Clone)]
pub struct AwsObjectStore {
    client: aws_sdk_s3::Client,
    buffer_uploads: bool,
}

impl AwsObjectStore {
    /// Wrap an SDK client; uploads are streamed from disk
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self {
            client,
            buffer_uploads: false,
        }
    }

    /// Read upload bodies into memory before sending.
    ///
    /// Needed when the client's transport cannot send streaming bodies,
    /// as with [`ProxyHttpClient`].
    pub fn with_buffered_uploads(mut self, buffer_uploads: bool) -> Self {
        self.buffer_uploads = buffer_uploads;
        self
    }

    async fn upload_body(&self, source: &Path) -> Result<ByteStream, StoreError> {
        if self.buffer_uploads {
            return Ok(ByteStream::from(tokio::fs::read(source).await?));
        }
        ByteStream::from_path(source)
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e)))
    }
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    #[tracing::instrument(
        name = "s3.head_object",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key, http.status_code = tracing::field::Empty),
        err
    )]
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, key, |se| se.is_not_found()))?;

        tracing::Span::current().record("http.status_code", 200);

        Ok(ObjectMetadata {
            content_length: content_length(output.content_length()),
            last_modified: output.last_modified().and_then(to_system_time),
            etag: output.e_tag().map(str::to_string),
        })
    }

    #[tracing::instrument(
        name = "s3.get_object",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key, download.bytes = tracing::field::Empty),
        err
    )]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, StoreError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, key, |se| se.is_no_such_key()))?;

        let metadata = ObjectMetadata {
            content_length: content_length(output.content_length()),
            last_modified: output.last_modified().and_then(to_system_time),
            etag: output.e_tag().map(str::to_string),
        };
        tracing::Span::current().record("download.bytes", metadata.content_length);

        Ok(ObjectContent {
            metadata,
            body: Box::pin(output.body.into_async_read()),
        })
    }

    #[tracing::instrument(
        name = "s3.list_objects",
        skip(self),
        fields(s3.bucket = %bucket, s3.prefix = %prefix, list.count = tracing::field::Empty),
        err
    )]
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<ObjectListing, StoreError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .delimiter(delimiter)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, prefix, |_| false))?;

        let listing = ObjectListing {
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
            keys: output
                .contents()
                .iter()
                .filter_map(|o| o.key().map(str::to_string))
                .collect(),
            truncated: output.is_truncated().unwrap_or(false),
        };

        tracing::Span::current().record(
            "list.count",
            listing.common_prefixes.len() + listing.keys.len(),
        );

        Ok(listing)
    }

    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, source),
        fields(s3.bucket = %bucket, s3.key = %key, upload.bytes = tracing::field::Empty, s3.etag = tracing::field::Empty),
        err
    )]
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<PutObjectOutcome, StoreError> {
        let bytes = tokio::fs::metadata(source).await?.len();
        let body = self.upload_body(source).await?;

        let output = self
            .client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_length(bytes as i64)
            .body(body)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, key, |_| false))?;

        let etag = output.e_tag().map(str::to_string);
        let span = tracing::Span::current();
        span.record("upload.bytes", bytes);
        if let Some(etag) = &etag {
            span.record("s3.etag", etag.as_str());
        }

        tracing::info!(bytes = bytes, "PutObject completed");

        Ok(PutObjectOutcome { etag, bytes })
    }

    #[tracing::instrument(name = "s3.get_bucket_location", skip(self), fields(s3.bucket = %bucket), err)]
    async fn bucket_location(&self, bucket: &str) -> Result<Option<String>, StoreError> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| store_error(e, bucket, "", |_| false))?;

        Ok(output
            .location_constraint()
            .map(|constraint| constraint.as_str().to_string()))
    }
}

fn content_length(length: Option<i64>) -> u64 {
    length.map(|l| l.max(0) as u64).unwrap_or(0)
}

fn to_system_time(time: &DateTime) -> Option<SystemTime> {
    SystemTime::try_from(*time).ok()
}

/// Map an SDK error, turning missing objects into `StoreError::NotFound`
fn store_error<E>(
    err: SdkError<E, HttpResponse>,
    bucket: &str,
    key: &str,
    is_not_found: impl Fn(&E) -> bool,
) -> StoreError
where
    E: ProvideErrorMetadata + StdError + Send + Sync + 'static,
{
    let modeled_not_found = err.as_service_error().map(&is_not_found).unwrap_or(false);
    let status_not_found = err
        .raw_response()
        .map(|response| response.status().as_u16() == 404)
        .unwrap_or(false);

    if modeled_not_found || status_not_found {
        return StoreError::not_found(bucket, key);
    }

    StoreError::Service(DisplayErrorContext(&err).to_string())
}

/// Builds `AwsObjectStore` clients
#[derive(Debug, Clone)]
pub struct AwsClientFactory {
    endpoint: Option<String>,
    force_path_style: bool,
    default_region: String,
}

impl AwsClientFactory {
    /// Factory for AWS S3 with the default region
    pub fn new() -> Self {
        Self {
            endpoint: None,
            force_path_style: false,
            default_region: DEFAULT_REGION.to_string(),
        }
    }

    /// Factory from the `s3` configuration section
    pub fn from_config(config: &S3Config) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            force_path_style: config.force_path_style,
            default_region: config.default_region.clone(),
        }
    }

    /// Send requests to a custom endpoint instead of AWS
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Address buckets in the path rather than the host
    pub fn with_force_path_style(mut self, force_path_style: bool) -> Self {
        self.force_path_style = force_path_style;
        self
    }
}

impl Default for AwsClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for AwsClientFactory {
    fn build(
        &self,
        credentials: &Credentials,
        region: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn ObjectStore>, StoreError> {
        let region = region.unwrap_or(&self.default_region).to_string();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials.to_sdk())
            .region(Region::new(region))
            .force_path_style(self.force_path_style)
            .request_checksum_calculation(RequestChecksumCalculation::WhenRequired);

        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(proxy) = proxy {
            let http_client =
                ProxyHttpClient::new(proxy).map_err(|e| StoreError::Config(e.to_string()))?;
            builder = builder.http_client(http_client);
        }

        let client = aws_sdk_s3::Client::from_conf(builder.build());
        Ok(Arc::new(
            AwsObjectStore::new(client).with_buffered_uploads(proxy.is_some()),
        ))
    }
}
