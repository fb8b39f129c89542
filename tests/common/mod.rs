//! Common Test Infrastructure
//!
//! Provides in-memory collaborators for handler and credential tests:
//! - `MemoryStore` - object store over a map, with scripted listings and delays
//! - `RecordingFactory` - client factory that records every build
//! - `RecordingRoleAssumer` - role assumer that records calls
//! - `CountingCredentials` - external provider that counts lookups

#![allow(dead_code)]

use async_trait::async_trait;
use s3_url_handler::credentials::{
    CredentialServices, Credentials, CredentialsError, ExternalCredentials, RoleAssumer,
    SourceOutcome,
};
use s3_url_handler::env::MemoryEnvironment;
use s3_url_handler::handler::{S3UrlHandler, TransferEvent, TransferListener};
use s3_url_handler::region::{HostResolver, RegionResolver};
use s3_url_handler::s3::{
    ClientFactory, ObjectContent, ObjectListing, ObjectMetadata, ObjectStore, ProxyConfig,
    PutObjectOutcome, StoreError,
};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Bucket used by most tests
pub const TEST_BUCKET: &str = "releases";

/// Last-modified time given to seeded objects
pub fn seeded_time() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1_650_000_000)
}

/// Environment with global credentials only
pub fn env_with_global_keys() -> MemoryEnvironment {
    MemoryEnvironment::new()
        .with_var("AWS_ACCESS_KEY_ID", "AKIDGLOBAL")
        .with_var("AWS_SECRET_KEY", "global-secret")
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: SystemTime,
}

/// In-memory object store
#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    scripted_listing: Mutex<Option<ObjectListing>>,
    location: Mutex<Option<Result<Option<String>, String>>>,
    delay: Mutex<Option<Duration>>,
    pub location_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, bucket: &str, key: &str, data: &[u8]) {
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                last_modified: seeded_time(),
            },
        );
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    pub fn script_listing(&self, listing: ObjectListing) {
        *self.scripted_listing.lock().unwrap() = Some(listing);
    }

    pub fn set_location(&self, location: Result<Option<&str>, &str>) {
        *self.location.lock().unwrap() = Some(
            location
                .map(|l| l.map(str::to_string))
                .map_err(str::to_string),
        );
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn maybe_delay(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn object(&self, bucket: &str, key: &str) -> Result<StoredObject, StoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMetadata, StoreError> {
        self.maybe_delay().await;
        let object = self.object(bucket, key)?;
        Ok(ObjectMetadata {
            content_length: object.data.len() as u64,
            last_modified: Some(object.last_modified),
            etag: Some("\"memory\"".into()),
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectContent, StoreError> {
        self.maybe_delay().await;
        let object = self.object(bucket, key)?;
        Ok(ObjectContent {
            metadata: ObjectMetadata {
                content_length: object.data.len() as u64,
                last_modified: Some(object.last_modified),
                etag: None,
            },
            body: Box::pin(std::io::Cursor::new(object.data)),
        })
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<ObjectListing, StoreError> {
        if let Some(listing) = self.scripted_listing.lock().unwrap().clone() {
            return Ok(listing);
        }

        let objects = self.objects.lock().unwrap();
        let mut common_prefixes = BTreeSet::new();
        let mut keys = BTreeSet::new();

        for (b, key) in objects.keys() {
            if b != bucket {
                continue;
            }
            let Some(rest) = key.strip_prefix(prefix) else {
                continue;
            };
            match rest.find(delimiter) {
                Some(idx) => {
                    common_prefixes.insert(format!("{}{}", prefix, &rest[..idx + delimiter.len()]));
                }
                None => {
                    keys.insert(key.clone());
                }
            }
        }

        Ok(ObjectListing {
            common_prefixes: common_prefixes.into_iter().collect(),
            keys: keys.into_iter().collect(),
            truncated: false,
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        source: &Path,
    ) -> Result<PutObjectOutcome, StoreError> {
        let data = tokio::fs::read(source).await?;
        let bytes = data.len() as u64;
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data,
                last_modified: SystemTime::now(),
            },
        );
        Ok(PutObjectOutcome {
            etag: Some("\"uploaded\"".into()),
            bytes,
        })
    }

    async fn bucket_location(&self, _bucket: &str) -> Result<Option<String>, StoreError> {
        self.location_calls.fetch_add(1, Ordering::SeqCst);
        match self.location.lock().unwrap().clone() {
            Some(Ok(location)) => Ok(location),
            Some(Err(message)) => Err(StoreError::Service(message)),
            None => Err(StoreError::Service("AccessDenied".into())),
        }
    }
}

/// One recorded client build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    pub access_key_id: String,
    pub session_token: Option<String>,
    pub region: Option<String>,
    pub proxy: Option<ProxyConfig>,
}

/// Client factory handing out a shared `MemoryStore`
pub struct RecordingFactory {
    pub store: Arc<MemoryStore>,
    pub builds: Mutex<Vec<Build>>,
}

impl RecordingFactory {
    pub fn new(store: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            builds: Mutex::new(Vec::new()),
        })
    }

    pub fn builds(&self) -> Vec<Build> {
        self.builds.lock().unwrap().clone()
    }
}

impl ClientFactory for RecordingFactory {
    fn build(
        &self,
        credentials: &Credentials,
        region: Option<&str>,
        proxy: Option<&ProxyConfig>,
    ) -> Result<Arc<dyn ObjectStore>, StoreError> {
        self.builds.lock().unwrap().push(Build {
            access_key_id: credentials.access_key_id().to_string(),
            session_token: credentials.session_token().map(str::to_string),
            region: region.map(str::to_string),
            proxy: proxy.cloned(),
        });
        Ok(self.store.clone())
    }
}

/// Host resolver that never finds a name
pub struct NoDns;

#[async_trait]
impl HostResolver for NoDns {
    async fn canonical_name(&self, _host: &str) -> Option<String> {
        None
    }
}

/// Host resolver returning a fixed canonical name
pub struct FixedDns(pub &'static str);

#[async_trait]
impl HostResolver for FixedDns {
    async fn canonical_name(&self, _host: &str) -> Option<String> {
        Some(self.0.to_string())
    }
}

/// Role assumer returning temporary credentials and recording each call
#[derive(Default)]
pub struct RecordingRoleAssumer {
    pub calls: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl RoleAssumer for RecordingRoleAssumer {
    async fn assume_role(
        &self,
        base: &Credentials,
        role_arn: &str,
        session_name: &str,
    ) -> Result<Credentials, CredentialsError> {
        self.calls.lock().unwrap().push((
            base.access_key_id().to_string(),
            role_arn.to_string(),
            session_name.to_string(),
        ));
        Ok(Credentials::with_session_token(
            "ASIATEMPORARY",
            "temporary-secret",
            "session-token",
        ))
    }
}

/// External provider that resolves fixed credentials and counts lookups
pub struct CountingCredentials {
    credentials: Credentials,
    pub calls: AtomicUsize,
}

impl CountingCredentials {
    pub fn new(access_key_id: &str) -> Arc<Self> {
        Arc::new(Self {
            credentials: Credentials::new(access_key_id, "counted-secret"),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalCredentials for CountingCredentials {
    fn name(&self) -> &str {
        "counting"
    }

    async fn fetch(&self) -> SourceOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        SourceOutcome::Resolved(self.credentials.clone())
    }
}

/// Listener recording every event
#[derive(Default)]
pub struct RecordingListener {
    pub started: Mutex<Vec<TransferEvent>>,
    pub completed: Mutex<Vec<TransferEvent>>,
}

impl TransferListener for RecordingListener {
    fn transfer_started(&self, event: &TransferEvent) {
        self.started.lock().unwrap().push(event.clone());
    }

    fn transfer_completed(&self, event: &TransferEvent) {
        self.completed.lock().unwrap().push(event.clone());
    }
}

/// Handler over `factory` with DNS disabled and the service tier enabled
pub fn handler(env: MemoryEnvironment, factory: Arc<RecordingFactory>) -> S3UrlHandler {
    let services = CredentialServices::new(Arc::new(env), Arc::new(RecordingRoleAssumer::default()));
    S3UrlHandler::new(services, factory, RegionResolver::new(Arc::new(NoDns)))
}
