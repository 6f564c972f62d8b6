//! Metadata suggestions for query editors
//!
//! Regions, namespaces, metric names and dimension keys, returned as sorted
//! `{text, value}` pairs. Built-in namespaces answer from the static catalog;
//! custom namespaces go through the discovery cache.

use crate::cache::CustomMetricsCache;
use crate::catalog::{is_custom_namespace, StaticCatalog, REGIONS};
use crate::client::ClientFactory;
use crate::error::Result;
use crate::types::DatasourceInfo;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One selectable suggestion
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SuggestItem {
    /// Displayed text
    pub text: String,
    /// Submitted value
    pub value: String,
}

impl SuggestItem {
    /// Suggestion whose text and value are both `value`
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            text: value.clone(),
            value,
        }
    }
}

fn sorted_suggestions<I, S>(values: I) -> Vec<SuggestItem>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut items: Vec<SuggestItem> = values.into_iter().map(SuggestItem::new).collect();
    items.sort();
    items
}

/// Answers the `__Get*` metadata actions
pub struct MetadataService {
    catalog: StaticCatalog,
    cache: Arc<CustomMetricsCache>,
    custom_namespaces: Vec<String>,
}

impl MetadataService {
    /// Create a service over a catalog, a shared cache and the datasource's
    /// custom namespaces
    pub fn new(
        catalog: StaticCatalog,
        cache: Arc<CustomMetricsCache>,
        custom_namespaces: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            cache,
            custom_namespaces,
        }
    }

    /// The discovery cache
    pub fn cache(&self) -> &Arc<CustomMetricsCache> {
        &self.cache
    }

    /// Selectable regions
    pub fn regions(&self) -> Vec<SuggestItem> {
        sorted_suggestions(REGIONS.iter().copied())
    }

    /// Catalog namespaces plus the configured custom namespaces
    pub fn namespaces(&self) -> Vec<SuggestItem> {
        let mut items = sorted_suggestions(
            self.catalog
                .namespaces()
                .map(str::to_string)
                .chain(self.custom_namespaces.iter().cloned()),
        );
        items.dedup();
        items
    }

    /// Metric names of `info.namespace`
    pub async fn metrics(
        &self,
        info: &DatasourceInfo,
        clients: &dyn ClientFactory,
    ) -> Result<Vec<SuggestItem>> {
        if !is_custom_namespace(&info.namespace) {
            let names = self.catalog.metric_names(&info.namespace)?;
            return Ok(sorted_suggestions(names.iter().cloned()));
        }
        let names = self.cache.metric_names(info, clients).await?;
        Ok(sorted_suggestions(names))
    }

    /// Dimension keys of `info.namespace`
    pub async fn dimension_keys(
        &self,
        info: &DatasourceInfo,
        clients: &dyn ClientFactory,
    ) -> Result<Vec<SuggestItem>> {
        if !is_custom_namespace(&info.namespace) {
            let keys = self.catalog.dimension_keys(&info.namespace)?;
            return Ok(sorted_suggestions(keys.iter().cloned()));
        }
        let keys = self.cache.dimension_keys(info, clients).await?;
        Ok(sorted_suggestions(keys))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stubs::InMemoryCloudWatch;
    use crate::client::StaticClientFactory;
    use crate::types::{Dimension, MetricDescriptor};

    fn service() -> MetadataService {
        MetadataService::new(
            StaticCatalog::embedded().unwrap(),
            Arc::new(CustomMetricsCache::new()),
            vec!["Custom/App".to_string(), "AWS/EC2".to_string()],
        )
    }

    fn values(items: &[SuggestItem]) -> Vec<&str> {
        items.iter().map(|i| i.value.as_str()).collect()
    }

    #[test]
    fn test_regions_sorted() {
        let regions = service().regions();
        assert_eq!(regions.len(), REGIONS.len());
        assert_eq!(regions[0].text, "ap-northeast-1");
        assert!(regions.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_namespaces_include_custom() {
        let namespaces = service().namespaces();
        let values = values(&namespaces);
        assert!(values.contains(&"Custom/App"));
        assert_eq!(values.iter().filter(|v| **v == "AWS/EC2").count(), 1);
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_builtin_namespace_never_calls_upstream() {
        let api = Arc::new(InMemoryCloudWatch::new());
        let factory = StaticClientFactory::new(api.clone());
        let service = service();
        let info = DatasourceInfo::new("default", "us-east-1").with_namespace("AWS/EC2");

        let metrics = service.metrics(&info, &factory).await.unwrap();
        assert!(values(&metrics).contains(&"CPUUtilization"));
        assert!(api.calls().is_empty());

        let missing = info.with_namespace("AWS/Nope");
        let err = service.dimension_keys(&missing, &factory).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn test_custom_namespace_sorted_from_discovery() {
        let api = Arc::new(InMemoryCloudWatch::new().with_metric_pages(
            "Custom/App",
            vec![vec![
                MetricDescriptor {
                    namespace: "Custom/App".to_string(),
                    metric_name: "Requests".to_string(),
                    dimensions: vec![Dimension::new("Stage", "prod")],
                },
                MetricDescriptor {
                    namespace: "Custom/App".to_string(),
                    metric_name: "Errors".to_string(),
                    dimensions: vec![Dimension::new("Host", "a")],
                },
            ]],
        ));
        let factory = StaticClientFactory::new(api);
        let service = service();
        let info = DatasourceInfo::new("default", "us-east-1").with_namespace("Custom/App");

        let metrics = service.metrics(&info, &factory).await.unwrap();
        assert_eq!(values(&metrics), vec!["Errors", "Requests"]);

        let keys = service.dimension_keys(&info, &factory).await.unwrap();
        assert_eq!(values(&keys), vec!["Host", "Stage"]);

        // The cache keeps first-seen order; only the suggestions are sorted
        assert_eq!(
            service
                .cache()
                .metric_name_cache()
                .cached(&info)
                .await
                .unwrap(),
            vec!["Requests", "Errors"]
        );
    }
}
