//! URL handler
//!
//! `S3UrlHandler` implements the operations a dependency resolver calls on
//! an S3 URL: `stat`, `open`, `list`, `fetch` and `put`, plus accessors
//! derived from `stat`.
//!
//! Each operation parses the URL once, resolves credentials for the bucket,
//! finds the bucket region and builds a fresh client for it.
//!
//! # Not-found handling
//!
//! | Operation | Missing object |
//! |-----------|----------------|
//! | `stat`, accessors | `UrlInfo::unavailable()` |
//! | `open`, `fetch` | `HandlerError::NotFound` |

mod listener;

pub use listener::{LoggingListener, TransferDirection, TransferEvent, TransferListener};

use crate::config::Config;
use crate::credentials::role::{SdkCredentials, StsRoleAssumer};
use crate::credentials::{
    CredentialServices, Credentials, CredentialsCache, CredentialsError, ProviderChain,
};
use crate::env::SystemEnvironment;
use crate::metrics::{self, OperationTimer};
use crate::region::RegionResolver;
use crate::s3::{
    AwsClientFactory, ClientFactory, ObjectMetadata, ObjectReader, ObjectStore, ProxyConfig,
    PutObjectOutcome, StoreError,
};
use crate::uri::{S3Location, UriError};
use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

/// Delimiter used for one-level listings
const LIST_DELIMITER: &str = "/";

/// Handler errors
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    InvalidUrl(#[from] UriError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    #[error("Object not found: {url}")]
    NotFound { url: String },

    #[error("Listing of {url} is truncated; paginated listings are not supported")]
    TruncatedListing { url: String },

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },
}

impl HandlerError {
    /// Map a store error for the object at `url`
    fn from_store(url: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => HandlerError::NotFound {
                url: url.to_string(),
            },
            other => HandlerError::from(other),
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { bucket, key } => HandlerError::NotFound {
                url: format!("s3://{}/{}", bucket, key),
            },
            StoreError::Io(e) => HandlerError::Io(e),
            other => HandlerError::Store(other),
        }
    }
}

/// Result of `stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlInfo {
    pub available: bool,
    pub content_length: u64,
    pub last_modified: Option<SystemTime>,
}

impl UrlInfo {
    /// Info for an object that does not exist
    pub fn unavailable() -> Self {
        Self {
            available: false,
            content_length: 0,
            last_modified: None,
        }
    }

    /// Info for an existing object
    pub fn from_metadata(metadata: &ObjectMetadata) -> Self {
        Self {
            available: true,
            content_length: metadata.content_length,
            last_modified: metadata.last_modified,
        }
    }

    /// Last-modified time in milliseconds since the epoch, 0 if unknown
    pub fn last_modified_millis(&self) -> i64 {
        self.last_modified
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0)
    }
}

/// S3 URL handler
pub struct S3UrlHandler {
    services: CredentialServices,
    factory: Arc<dyn ClientFactory>,
    regions: RegionResolver,
    credentials_cache: Option<CredentialsCache>,
}

impl S3UrlHandler {
    /// Create a handler from its collaborators
    pub fn new(
        services: CredentialServices,
        factory: Arc<dyn ClientFactory>,
        regions: RegionResolver,
    ) -> Self {
        Self {
            services,
            factory,
            regions,
            credentials_cache: None,
        }
    }

    /// Handler backed by AWS, the real process environment and `config`
    pub fn from_config(config: &Config) -> Self {
        let environment = Arc::new(SystemEnvironment::from_config(config));
        let services = CredentialServices::new(
            environment,
            Arc::new(StsRoleAssumer::new(config.sts.region.clone())),
        )
        .with_profile(Arc::new(SdkCredentials::profile(config.profile.as_deref())))
        .with_instance_metadata(Arc::new(SdkCredentials::instance_metadata()))
        .with_session_name(config.sts.session_name.clone());

        let regions = RegionResolver::system()
            .with_dns_lookup(config.region_lookup.dns)
            .with_service_lookup(config.region_lookup.service)
            .with_cache(config.cache.regions);

        let handler = Self::new(
            services,
            Arc::new(AwsClientFactory::from_config(&config.s3)),
            regions,
        );

        if config.cache.credentials {
            handler.with_credentials_cache()
        } else {
            handler
        }
    }

    /// Cache resolved credentials per bucket
    pub fn with_credentials_cache(mut self) -> Self {
        self.credentials_cache = Some(CredentialsCache::new());
        self
    }

    /// Credentials for `bucket`, from the cache when enabled
    pub async fn credentials_for(&self, bucket: &str) -> Result<Credentials, HandlerError> {
        let chain = ProviderChain::for_bucket(bucket);
        let credentials = match &self.credentials_cache {
            Some(cache) => cache.get_or_resolve(&chain, &self.services).await?,
            None => chain.resolve(&self.services).await?,
        };
        Ok(credentials)
    }

    /// Client for the bucket addressed by `url`, in the bucket's region.
    ///
    /// A default-region client is built first; it serves the bucket
    /// location lookup and is replaced once a region is known.
    #[instrument(skip(self), fields(s3.bucket = tracing::field::Empty, s3.key = tracing::field::Empty))]
    pub async fn client_for(
        &self,
        url: &str,
    ) -> Result<(Arc<dyn ObjectStore>, S3Location), HandlerError> {
        let location = S3Location::parse(url)?;
        let span = tracing::Span::current();
        span.record("s3.bucket", location.bucket());
        span.record("s3.key", location.key());

        let credentials = self.credentials_for(location.bucket()).await?;
        let proxy = ProxyConfig::from_environment(self.services.environment.as_ref());
        if let Some(ref proxy) = proxy {
            debug!(proxy.host = %proxy.host, proxy.port = proxy.port, "Using proxy");
        }

        let default_client = self.factory.build(&credentials, None, proxy.as_ref())?;
        let store = match self.regions.resolve(&location, default_client.as_ref()).await {
            Some(region) => self.factory.build(&credentials, Some(region), proxy.as_ref())?,
            None => default_client,
        };

        Ok((store, location))
    }

    /// Metadata for `url`; a missing object is reported as unavailable
    #[instrument(skip(self))]
    pub async fn stat(&self, url: &str) -> Result<UrlInfo, HandlerError> {
        let timer = OperationTimer::start("stat");
        let result: Result<UrlInfo, HandlerError> = async {
            let (store, location) = self.client_for(url).await?;
            match store.head_object(location.bucket(), location.key()).await {
                Ok(metadata) => Ok(UrlInfo::from_metadata(&metadata)),
                Err(StoreError::NotFound { .. }) => {
                    debug!("Object not found");
                    Ok(UrlInfo::unavailable())
                }
                Err(e) => Err(HandlerError::from_store(url, e)),
            }
        }
        .await;
        timer.finish(result)
    }

    /// Stream the object at `url`. The caller owns the returned reader.
    #[instrument(skip(self))]
    pub async fn open(&self, url: &str) -> Result<ObjectReader, HandlerError> {
        let timer = OperationTimer::start("open");
        let result: Result<ObjectReader, HandlerError> = async {
            let (store, location) = self.client_for(url).await?;
            let content = store
                .get_object(location.bucket(), location.key())
                .await
                .map_err(|e| HandlerError::from_store(url, e))?;
            Ok(content.body)
        }
        .await;
        timer.finish(result)
    }

    /// URLs one level below `url`: common prefixes first, then objects.
    ///
    /// The prefix's own marker object and duplicates are dropped. A truncated
    /// listing is an error.
    #[instrument(skip(self))]
    pub async fn list(&self, url: &str) -> Result<Vec<String>, HandlerError> {
        let timer = OperationTimer::start("list");
        let result: Result<Vec<String>, HandlerError> = async {
            let (store, location) = self.client_for(url).await?;
            let prefix = location.bucket_ref().list_prefix();
            let listing = store
                .list_objects(location.bucket(), &prefix, LIST_DELIMITER)
                .await
                .map_err(|e| HandlerError::from_store(url, e))?;

            if listing.truncated {
                return Err(HandlerError::TruncatedListing {
                    url: url.to_string(),
                });
            }

            let mut seen = HashSet::new();
            let children = listing
                .common_prefixes
                .iter()
                .chain(listing.keys.iter())
                .filter(|key| key.as_str() != prefix)
                .map(|key| location.child_url(&prefix, key))
                .filter(|child| seen.insert(child.clone()))
                .collect::<Vec<_>>();

            debug!(count = children.len(), "Listed children");
            Ok(children)
        }
        .await;
        timer.finish(result)
    }

    /// Download the object at `url` to `destination`.
    ///
    /// The file's modification time is set to the object's last-modified
    /// time. The body is written to a sibling `.part` file that is renamed
    /// over `destination` only once complete, so a failed download leaves
    /// any existing file untouched.
    #[instrument(skip(self, destination, listener), fields(destination = %destination.display()))]
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        listener: Option<&dyn TransferListener>,
    ) -> Result<u64, HandlerError> {
        let timer = OperationTimer::start("fetch");
        let result: Result<u64, HandlerError> = async {
            let (store, location) = self.client_for(url).await?;
            let content = store
                .get_object(location.bucket(), location.key())
                .await
                .map_err(|e| HandlerError::from_store(url, e))?;

            let event = TransferEvent::started(
                url,
                TransferDirection::Download,
                Some(content.metadata.content_length),
            );
            if let Some(listener) = listener {
                listener.transfer_started(&event);
            }

            let written =
                write_file(content.body, destination, content.metadata.last_modified).await?;

            metrics::record_transfer_bytes(TransferDirection::Download.as_str(), written);
            if let Some(listener) = listener {
                listener.transfer_completed(&event.completed(written));
            }
            Ok(written)
        }
        .await;
        timer.finish(result)
    }

    /// Upload the file at `source` to `url`
    #[instrument(skip(self, source, listener), fields(source = %source.display()))]
    pub async fn put(
        &self,
        source: &Path,
        url: &str,
        listener: Option<&dyn TransferListener>,
    ) -> Result<PutObjectOutcome, HandlerError> {
        let timer = OperationTimer::start("put");
        let result: Result<PutObjectOutcome, HandlerError> = async {
            let size = tokio::fs::metadata(source).await?.len();
            let (store, location) = self.client_for(url).await?;

            let event = TransferEvent::started(url, TransferDirection::Upload, Some(size));
            if let Some(listener) = listener {
                listener.transfer_started(&event);
            }

            let outcome = store
                .put_object(location.bucket(), location.key(), source)
                .await
                .map_err(|e| HandlerError::from_store(url, e))?;

            metrics::record_transfer_bytes(TransferDirection::Upload.as_str(), outcome.bytes);
            if let Some(listener) = listener {
                listener.transfer_completed(&event.completed(outcome.bytes));
            }
            Ok(outcome)
        }
        .await;
        timer.finish(result)
    }

    /// Whether the object at `url` exists
    pub async fn is_reachable(&self, url: &str) -> Result<bool, HandlerError> {
        Ok(self.stat(url).await?.available)
    }

    /// Size of the object at `url`, 0 if it does not exist
    pub async fn content_length(&self, url: &str) -> Result<u64, HandlerError> {
        Ok(self.stat(url).await?.content_length)
    }

    /// Last-modified time of the object at `url` in epoch milliseconds, 0 if
    /// it does not exist
    pub async fn last_modified(&self, url: &str) -> Result<i64, HandlerError> {
        Ok(self.stat(url).await?.last_modified_millis())
    }

    /// `stat` bounded by `timeout`
    pub async fn stat_within(&self, url: &str, timeout: Duration) -> Result<UrlInfo, HandlerError> {
        within("stat", timeout, self.stat(url)).await
    }

    /// `is_reachable` bounded by `timeout`
    pub async fn is_reachable_within(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<bool, HandlerError> {
        within("is_reachable", timeout, self.is_reachable(url)).await
    }

    /// `content_length` bounded by `timeout`
    pub async fn content_length_within(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<u64, HandlerError> {
        within("content_length", timeout, self.content_length(url)).await
    }

    /// `last_modified` bounded by `timeout`
    pub async fn last_modified_within(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<i64, HandlerError> {
        within("last_modified", timeout, self.last_modified(url)).await
    }
}

async fn within<T, F>(operation: &'static str, timeout: Duration, future: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| HandlerError::Timeout { operation, timeout })?
}

/// Copy `body` into `destination` through a sibling partial file and stamp its mtime
async fn write_file(
    body: ObjectReader,
    destination: &Path,
    last_modified: Option<SystemTime>,
) -> std::io::Result<u64> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let partial = partial_path(destination);
    let result = write_partial(body, &partial, destination, last_modified).await;
    if result.is_err() {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            debug!(error = %cleanup, path = %partial.display(), "Could not remove partial download");
        }
    }
    result
}

async fn write_partial(
    mut body: ObjectReader,
    partial: &Path,
    destination: &Path,
    last_modified: Option<SystemTime>,
) -> std::io::Result<u64> {
    let mut file = tokio::fs::File::create(partial).await?;
    let written = tokio::io::copy(&mut body, &mut file).await?;
    file.flush().await?;

    // The handle is closed inside the blocking task, before the rename.
    let file = file.into_std().await;
    tokio::task::spawn_blocking(move || match last_modified {
        Some(modified) => file.set_modified(modified),
        None => Ok(()),
    })
    .await
    .map_err(std::io::Error::other)??;

    tokio::fs::rename(partial, destination).await?;
    Ok(written)
}

/// `.<name>.<pid>.part` next to `destination`
fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    destination.with_file_name(format!(".{}.{}.part", name, std::process::id()))
}

impl std::fmt::Debug for S3UrlHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3UrlHandler")
            .field("services", &self.services)
            .field("regions", &self.regions)
            .field("credentials_cache", &self.credentials_cache.is_some())
            .finish_non_exhaustive()
    }
}
