//! Custom-metric discovery cache
//!
//! Memoizes the metric names and dimension keys found in custom namespaces,
//! keyed by credential profile, region and namespace. Entries live for a
//! fixed TTL (5 minutes by default) and are repopulated on the first access
//! after they go stale.
//!
//! # Locking
//!
//! One exclusive lock covers the whole nested map and is held across the
//! check, the remote listing and the write. Concurrent refreshes serialize,
//! even for unrelated namespaces, and a key is never fetched twice at once.
//!
//! # Failure
//!
//! A failed refresh writes nothing: the previous values and expiry stay in
//! place and later reads try again. Dropping the returned future mid-fetch
//! (timeout or request cancellation) also writes nothing.
//!
//! # Example
//!
//! ```rust
//! use kuba_cloudwatch::cache::{DiscoveryCache, DiscoveryKind};
//! use kuba_cloudwatch::types::{DatasourceInfo, MetricDescriptor};
//!
//! # tokio_test_block(async {
//! let cache = DiscoveryCache::new(DiscoveryKind::MetricNames);
//! let info = DatasourceInfo::new("default", "us-east-1").with_namespace("Custom/App");
//!
//! let names = cache
//!     .get_or_refresh(&info, || async {
//!         Ok(vec![MetricDescriptor {
//!             namespace: "Custom/App".to_string(),
//!             metric_name: "Latency".to_string(),
//!             dimensions: vec![],
//!         }])
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(names, vec!["Latency"]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use crate::error::{Error, Result};
use crate::metrics;
use crate::types::{DatasourceInfo, MetricDescriptor};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Default lifetime of a discovery entry
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// What a discovery cache extracts from a namespace's metric listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryKind {
    /// Distinct metric names
    MetricNames,
    /// Distinct dimension keys across all metrics
    DimensionKeys,
}

impl DiscoveryKind {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryKind::MetricNames => "metric_names",
            DiscoveryKind::DimensionKeys => "dimension_keys",
        }
    }

    /// Distinct values in first-seen order
    pub fn extract(&self, metrics: &[MetricDescriptor]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut values = Vec::new();
        let mut push = |value: &str| {
            if seen.insert(value.to_string()) {
                values.push(value.to_string());
            }
        };

        for metric in metrics {
            match self {
                DiscoveryKind::MetricNames => push(&metric.metric_name),
                DiscoveryKind::DimensionKeys => {
                    for dimension in &metric.dimensions {
                        push(&dimension.name);
                    }
                }
            }
        }
        values
    }
}

/// Lifecycle state of one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Never populated
    Uninitialized,
    /// Populated and within its TTL
    Fresh,
    /// Populated but past its TTL
    Stale,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    values: Vec<String>,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

type NamespaceEntries = HashMap<String, CacheEntry>;
type RegionEntries = HashMap<String, NamespaceEntries>;

/// TTL cache of discovered values, nested profile → region → namespace
pub struct DiscoveryCache {
    kind: DiscoveryKind,
    ttl: Duration,
    entries: Mutex<HashMap<String, RegionEntries>>,
}

impl DiscoveryCache {
    /// Create an empty cache with the default TTL
    pub fn new(kind: DiscoveryKind) -> Self {
        Self::with_ttl(kind, DEFAULT_TTL)
    }

    /// Create an empty cache with a custom TTL
    pub fn with_ttl(kind: DiscoveryKind, ttl: Duration) -> Self {
        Self {
            kind,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// What this cache extracts
    pub fn kind(&self) -> DiscoveryKind {
        self.kind
    }

    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Values for `info`'s (profile, region, namespace), refreshing through
    /// `fetch` when the entry is missing or stale
    ///
    /// An upstream failure of `fetch` is returned as [`Error::CacheRefresh`];
    /// any other error is returned unchanged. Either way the cache is not
    /// modified.
    pub async fn get_or_refresh<F, Fut>(&self, info: &DatasourceInfo, fetch: F) -> Result<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<MetricDescriptor>>>,
    {
        let mut entries = self.entries.lock().await;

        if let Some(entry) = lookup(&entries, info) {
            if entry.is_fresh(Instant::now()) {
                metrics::record_discovery_lookup(self.kind.as_str(), "hit");
                debug!(
                    cache = self.kind.as_str(),
                    profile = %info.profile,
                    region = %info.region,
                    namespace = %info.namespace,
                    "Discovery cache hit"
                );
                return Ok(entry.values.clone());
            }
        }

        metrics::record_discovery_lookup(self.kind.as_str(), "miss");
        let listed = match fetch().await {
            Ok(listed) => listed,
            Err(e) => {
                metrics::record_discovery_lookup(self.kind.as_str(), "refresh_error");
                warn!(
                    cache = self.kind.as_str(),
                    namespace = %info.namespace,
                    error = %e,
                    "Discovery refresh failed, keeping previous entry"
                );
                return Err(match e {
                    Error::Upstream(source) => Error::CacheRefresh {
                        namespace: info.namespace.clone(),
                        source,
                    },
                    other => other,
                });
            }
        };

        let values = self.kind.extract(&listed);
        debug!(
            cache = self.kind.as_str(),
            namespace = %info.namespace,
            values = values.len(),
            "Discovery cache refreshed"
        );

        entries
            .entry(info.profile.clone())
            .or_default()
            .entry(info.region.clone())
            .or_default()
            .insert(
                info.namespace.clone(),
                CacheEntry {
                    values: values.clone(),
                    expires_at: Instant::now() + self.ttl,
                },
            );

        Ok(values)
    }

    /// Stored values for a key regardless of staleness
    pub async fn cached(&self, info: &DatasourceInfo) -> Option<Vec<String>> {
        let entries = self.entries.lock().await;
        lookup(&entries, info).map(|entry| entry.values.clone())
    }

    /// Lifecycle state of a key
    pub async fn state(&self, info: &DatasourceInfo) -> EntryState {
        let entries = self.entries.lock().await;
        match lookup(&entries, info) {
            None => EntryState::Uninitialized,
            Some(entry) if entry.is_fresh(Instant::now()) => EntryState::Fresh,
            Some(_) => EntryState::Stale,
        }
    }

    /// Number of populated keys
    pub async fn len(&self) -> usize {
        let entries = self.entries.lock().await;
        entries
            .values()
            .flat_map(|regions| regions.values())
            .map(|namespaces| namespaces.len())
            .sum()
    }

    /// True when no key was ever populated
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn lookup<'a>(
    entries: &'a HashMap<String, RegionEntries>,
    info: &DatasourceInfo,
) -> Option<&'a CacheEntry> {
    entries
        .get(&info.profile)?
        .get(&info.region)?
        .get(&info.namespace)
}
