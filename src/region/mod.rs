//! Bucket region resolution
//!
//! Finds the region a bucket lives in, trying three tiers in order:
//!
//! 1. **URL**: a region named by the endpoint or anywhere in the URL text
//! 2. **DNS**: reverse lookup of `<bucket>.s3.amazonaws.com`, scanned for a region
//! 3. **Service**: the bucket location API, via a default-region client
//!
//! Every tier is soft: a failure means "no hint" and the next tier runs. The
//! first hint is translated through the known-region table; an unknown hint
//! yields no region, leaving the client default in place.

use crate::metrics;
use crate::s3::ObjectStore;
use crate::uri::{RegionMatcher, S3Location};
use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::Resolver;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

/// Region identifiers the store client understands
pub const KNOWN_REGIONS: &[&str] = &[
    "us-east-1",
    "us-east-2",
    "us-west-1",
    "us-west-2",
    "us-gov-east-1",
    "us-gov-west-1",
    "ca-central-1",
    "ca-west-1",
    "sa-east-1",
    "mx-central-1",
    "eu-central-1",
    "eu-central-2",
    "eu-west-1",
    "eu-west-2",
    "eu-west-3",
    "eu-north-1",
    "eu-south-1",
    "eu-south-2",
    "il-central-1",
    "me-south-1",
    "me-central-1",
    "af-south-1",
    "ap-east-1",
    "ap-south-1",
    "ap-south-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-southeast-3",
    "ap-southeast-4",
    "ap-southeast-5",
    "ap-southeast-7",
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-northeast-3",
    "cn-north-1",
    "cn-northwest-1",
];

/// Translate a region hint into a known region identifier
pub fn lookup_region(hint: &str) -> Option<&'static str> {
    let hint = hint.trim();
    KNOWN_REGIONS
        .iter()
        .copied()
        .find(|region| region.eq_ignore_ascii_case(hint))
}

/// Region named by a bucket location constraint.
///
/// The empty constraint and the legacy `US` value mean `us-east-1`; the
/// legacy `EU` value means `eu-west-1`.
pub fn region_from_location_constraint(constraint: Option<&str>) -> &str {
    match constraint.map(str::trim) {
        None | Some("") | Some("US") => "us-east-1",
        Some("EU") => "eu-west-1",
        Some(other) => other,
    }
}

/// Which tier produced a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionTier {
    Url,
    Dns,
    Service,
    Cache,
}

impl RegionTier {
    /// Metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            RegionTier::Url => "url",
            RegionTier::Dns => "dns",
            RegionTier::Service => "service",
            RegionTier::Cache => "cache",
        }
    }
}

impl fmt::Display for RegionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves host names to their canonical names
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Canonical name behind `host`, or `None` if it cannot be determined
    async fn canonical_name(&self, host: &str) -> Option<String>;
}

/// Host resolver using the system DNS configuration.
///
/// Forward-resolves the host, then takes the first PTR record of the first
/// address. The underlying resolver is built on first use; if the system
/// configuration cannot be read the resolver defaults apply.
#[derive(Default)]
pub struct SystemHostResolver {
    resolver: OnceCell<Resolver<TokioConnectionProvider>>,
}

impl SystemHostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolver(&self) -> &Resolver<TokioConnectionProvider> {
        self.resolver
            .get_or_init(|| async {
                match Resolver::builder_tokio() {
                    Ok(builder) => builder.build(),
                    Err(e) => {
                        debug!(error = %e, "System DNS configuration unavailable; using defaults");
                        Resolver::builder_with_config(
                            ResolverConfig::default(),
                            TokioConnectionProvider::default(),
                        )
                        .build()
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn canonical_name(&self, host: &str) -> Option<String> {
        let resolver = self.resolver().await;

        let ip = match resolver.lookup_ip(host).await {
            Ok(lookup) => lookup.iter().next()?,
            Err(e) => {
                debug!(host = %host, error = %e, "Forward lookup failed");
                return None;
            }
        };

        match resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .map(|name| name.to_string().trim_end_matches('.').to_string())
                .find(|name| !name.is_empty()),
            Err(e) => {
                debug!(host = %host, ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
        }
    }
}

impl fmt::Debug for SystemHostResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemHostResolver")
            .field("initialized", &self.resolver.initialized())
            .finish()
    }
}

/// Three-tier bucket region resolver
pub struct RegionResolver {
    host_resolver: Arc<dyn HostResolver>,
    dns_lookup: bool,
    service_lookup: bool,
    cache: Option<DashMap<String, &'static str>>,
}

impl RegionResolver {
    /// Resolver with every tier enabled and no cache
    pub fn new(host_resolver: Arc<dyn HostResolver>) -> Self {
        Self {
            host_resolver,
            dns_lookup: true,
            service_lookup: true,
            cache: None,
        }
    }

    /// Resolver using the system DNS resolver
    pub fn system() -> Self {
        Self::new(Arc::new(SystemHostResolver::new()))
    }

    /// Enable or disable the reverse DNS tier
    pub fn with_dns_lookup(mut self, enabled: bool) -> Self {
        self.dns_lookup = enabled;
        self
    }

    /// Enable or disable the bucket location tier
    pub fn with_service_lookup(mut self, enabled: bool) -> Self {
        self.service_lookup = enabled;
        self
    }

    /// Remember regions found by the DNS and service tiers per bucket
    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache = enabled.then(DashMap::new);
        self
    }

    /// Region of the bucket addressed by `location`.
    ///
    /// `store` is only used for the bucket location tier.
    #[instrument(skip(self, location, store), fields(s3.bucket = %location.bucket()))]
    pub async fn resolve(
        &self,
        location: &S3Location,
        store: &dyn ObjectStore,
    ) -> Option<&'static str> {
        let Some((hint, tier)) = self.hint(location, store).await else {
            metrics::record_region_resolution("none");
            debug!("No region hint; using client default");
            return None;
        };

        match lookup_region(&hint) {
            Some(region) => {
                debug!(region = %region, tier = %tier, "Region resolved");
                metrics::record_region_resolution(tier.as_str());
                if let (Some(cache), RegionTier::Dns | RegionTier::Service) = (&self.cache, tier) {
                    cache.insert(location.bucket().to_string(), region);
                }
                Some(region)
            }
            None => {
                debug!(hint = %hint, tier = %tier, "Unknown region hint; using client default");
                metrics::record_region_resolution("unknown");
                None
            }
        }
    }

    /// First raw region hint and the tier that produced it
    pub async fn hint(
        &self,
        location: &S3Location,
        store: &dyn ObjectStore,
    ) -> Option<(String, RegionTier)> {
        if let Some(hint) = location.region_hint() {
            return Some((hint, RegionTier::Url));
        }

        if let Some(cached) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.get(location.bucket()).map(|r| *r.value()))
        {
            return Some((cached.to_string(), RegionTier::Cache));
        }

        if self.dns_lookup {
            if let Some(hint) = self.dns_hint(location.bucket()).await {
                return Some((hint, RegionTier::Dns));
            }
        }

        if self.service_lookup {
            if let Some(hint) = self.service_hint(location.bucket(), store).await {
                return Some((hint, RegionTier::Service));
            }
        }

        None
    }

    async fn dns_hint(&self, bucket: &str) -> Option<String> {
        let host = format!("{}.s3.amazonaws.com", bucket);
        let canonical = self.host_resolver.canonical_name(&host).await?;
        let region = RegionMatcher::known().find(&canonical).map(str::to_string);
        debug!(host = %host, canonical = %canonical, region = ?region, "Reverse lookup");
        region
    }

    async fn service_hint(&self, bucket: &str, store: &dyn ObjectStore) -> Option<String> {
        match store.bucket_location(bucket).await {
            Ok(constraint) => Some(region_from_location_constraint(constraint.as_deref()).to_string()),
            Err(e) => {
                debug!(error = %e, "Bucket location lookup failed");
                None
            }
        }
    }
}

impl fmt::Debug for RegionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionResolver")
            .field("dns_lookup", &self.dns_lookup)
            .field("service_lookup", &self.service_lookup)
            .field("cache", &self.cache.as_ref().map(|c| c.len()))
            .finish()
    }
}
