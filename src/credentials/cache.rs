//! Per-bucket credentials cache
//!
//! Keeps the last credentials resolved for each bucket. Expired entries are
//! resolved again. Two tasks racing on a cold bucket may both resolve; the
//! later insert wins.

use super::{CredentialServices, Credentials, CredentialsError, ProviderChain};
use dashmap::DashMap;
use tracing::debug;

/// Concurrent bucket → credentials map
#[derive(Debug, Default)]
pub struct CredentialsCache {
    entries: DashMap<String, Credentials>,
}

impl CredentialsCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached credentials for `bucket`, or resolve through `chain` and cache them
    pub async fn get_or_resolve(
        &self,
        chain: &ProviderChain,
        services: &CredentialServices,
    ) -> Result<Credentials, CredentialsError> {
        if let Some(cached) = self.get(chain.bucket()) {
            return Ok(cached);
        }

        let resolved = chain.resolve(services).await?;
        self.entries
            .insert(chain.bucket().to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Cached, unexpired credentials for `bucket`
    pub fn get(&self, bucket: &str) -> Option<Credentials> {
        let entry = self.entries.get(bucket)?;
        if entry.is_expired() {
            drop(entry);
            debug!(s3.bucket = %bucket, "Cached credentials expired");
            self.entries.remove(bucket);
            return None;
        }
        Some(entry.value().clone())
    }

    /// Drop the entry for `bucket`
    pub fn invalidate(&self, bucket: &str) {
        self.entries.remove(bucket);
    }

    /// Number of cached buckets
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
