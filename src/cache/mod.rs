//! Discovery caches for custom namespaces
//!
//! [`CustomMetricsCache`] pairs the two process-wide caches (metric names and
//! dimension keys) and fills them from a namespace's full ListMetrics
//! listing. It is an explicit object shared through application state, so
//! tests build isolated instances.

mod discovery;

pub use discovery::{DiscoveryCache, DiscoveryKind, EntryState, DEFAULT_TTL};

use crate::client::ClientFactory;
use crate::error::Result;
use crate::types::DatasourceInfo;
use std::time::Duration;

/// Metric-name and dimension-key caches for custom namespaces
pub struct CustomMetricsCache {
    metric_names: DiscoveryCache,
    dimension_keys: DiscoveryCache,
}

impl Default for CustomMetricsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CustomMetricsCache {
    /// Create empty caches with the default TTL
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    /// Create empty caches with a custom TTL
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            metric_names: DiscoveryCache::with_ttl(DiscoveryKind::MetricNames, ttl),
            dimension_keys: DiscoveryCache::with_ttl(DiscoveryKind::DimensionKeys, ttl),
        }
    }

    /// Distinct metric names of `info.namespace`, first-seen order
    ///
    /// A client is only connected when the entry needs a refresh.
    pub async fn metric_names(
        &self,
        info: &DatasourceInfo,
        clients: &dyn ClientFactory,
    ) -> Result<Vec<String>> {
        self.metric_names
            .get_or_refresh(info, || list_namespace(info, clients))
            .await
    }

    /// Distinct dimension keys of `info.namespace`, first-seen order
    pub async fn dimension_keys(
        &self,
        info: &DatasourceInfo,
        clients: &dyn ClientFactory,
    ) -> Result<Vec<String>> {
        self.dimension_keys
            .get_or_refresh(info, || list_namespace(info, clients))
            .await
    }

    /// The metric-name cache
    pub fn metric_name_cache(&self) -> &DiscoveryCache {
        &self.metric_names
    }

    /// The dimension-key cache
    pub fn dimension_key_cache(&self) -> &DiscoveryCache {
        &self.dimension_keys
    }
}

async fn list_namespace(
    info: &DatasourceInfo,
    clients: &dyn ClientFactory,
) -> Result<Vec<crate::types::MetricDescriptor>> {
    let client = clients.connect(info).await?;
    Ok(client.list_all_metrics(&info.namespace).await?)
}
