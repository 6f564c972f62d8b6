//! End-to-End System Integration Tests
//!
//! Drives the query pipeline, annotations and discovery against the
//! in-memory CloudWatch backend.
//!
//! # Test Coverage
//!
//! 1. **Time series** - Parse, shifted fetch, transform, legend templating
//! 2. **Batches** - Per-refId results, failures isolated per query
//! 3. **Annotations** - Prefix and exact alarm lookup into event tables
//! 4. **Discovery** - TTL refresh, stale entries surviving failed refreshes

use kuba_cloudwatch::{
    cache::{CustomMetricsCache, EntryState},
    catalog::StaticCatalog,
    client::{stubs::InMemoryCloudWatch, StaticClientFactory, PUBLISH_DELAY_MS},
    metadata::MetadataService,
    query::{CloudWatchExecutor, Query, TsdbQuery},
    types::{
        AlarmHistoryItem, Datapoint, DatasourceInfo, Dimension, MetricAlarm, MetricDescriptor,
        Statistic, StatisticsResponse, TimeRange,
    },
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Test Helpers
// =============================================================================

fn datasource() -> DatasourceInfo {
    DatasourceInfo::new("default", "us-east-1")
}

fn latency_response() -> StatisticsResponse {
    StatisticsResponse {
        label: Some("TargetResponseTime".to_string()),
        datapoints: vec![
            Datapoint {
                timestamp: 120_000,
                average: Some(0.25),
                extended_statistics: HashMap::from([("p99.00".to_string(), 1.5)]),
                ..Default::default()
            },
            Datapoint {
                timestamp: 60_000,
                average: Some(0.5),
                ..Default::default()
            },
        ],
    }
}

fn custom_metric(name: &str, dimension: &str) -> MetricDescriptor {
    MetricDescriptor {
        namespace: "Custom/App".to_string(),
        metric_name: name.to_string(),
        dimensions: vec![Dimension::new(dimension, "x")],
    }
}

// =============================================================================
// Time Series
// =============================================================================

#[tokio::test]
async fn test_time_series_end_to_end() {
    let api = Arc::new(
        InMemoryCloudWatch::new().with_statistics("TargetResponseTime", latency_response()),
    );
    let factory = Arc::new(StaticClientFactory::new(api.clone()));
    let executor = CloudWatchExecutor::new(datasource(), factory.clone());

    let request = TsdbQuery {
        time_range: TimeRange::new(3_600_000, 7_200_000).unwrap(),
        queries: vec![Query::new(
            "A",
            json!({
                "region": "eu-central-1",
                "namespace": "AWS/ApplicationELB",
                "metricName": "TargetResponseTime",
                "dimensions": { "LoadBalancer": "app/web/1" },
                "statistics": ["Average", "p99.00"],
                "period": "60",
                "alias": "{{namespace}} {{LoadBalancer}} {{stat}}"
            }),
        )],
    };

    let response = executor.execute(&request).await;
    let result = response.get("A").unwrap();
    assert!(!result.is_error(), "{:?}", result.error);

    let names: Vec<&str> = result.series.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "AWS/ApplicationELB app/web/1 Average",
            "AWS/ApplicationELB app/web/1 p99.00"
        ]
    );

    // Ascending, with the extended statistic present only where reported
    let average = &result.series[0];
    assert_eq!(average.points[0].timestamp, 60_000);
    assert_eq!(average.points[1].value, Some(0.25));
    assert_eq!(average.tags.get("LoadBalancer").unwrap(), "app/web/1");
    assert_eq!(result.series[1].points.len(), 1);

    assert_eq!(factory.connected_regions(), vec!["eu-central-1"]);
    match &api.calls()[0] {
        kuba_cloudwatch::client::stubs::RecordedCall::GetMetricStatistics(r) => {
            assert_eq!(r.range.start, 3_600_000 - PUBLISH_DELAY_MS);
            assert_eq!(r.range.end, 7_200_000 - PUBLISH_DELAY_MS);
            assert_eq!(r.statistics, vec![Statistic::Average]);
            assert_eq!(r.extended_statistics, vec!["p99.00".to_string()]);
            assert_eq!(r.period, 60);
        }
        other => panic!("unexpected call {:?}", other),
    }
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let api = Arc::new(InMemoryCloudWatch::new());
    let executor = CloudWatchExecutor::new(
        datasource(),
        Arc::new(StaticClientFactory::new(api.clone())),
    );

    let request = TsdbQuery {
        time_range: TimeRange::new(0, 600_000).unwrap(),
        queries: vec![
            Query::new(
                "ok",
                json!({ "namespace": "AWS/EC2", "metricName": "CPUUtilization", "statistics": ["Sum"] }),
            ),
            Query::new(
                "bad-period",
                json!({
                    "namespace": "AWS/EC2",
                    "metricName": "CPUUtilization",
                    "statistics": ["Sum"],
                    "period": "abc"
                }),
            ),
        ],
    };

    let response = executor.execute(&request).await;
    assert!(!response.get("ok").unwrap().is_error());
    assert!(response
        .get("bad-period")
        .unwrap()
        .error
        .as_deref()
        .unwrap()
        .contains("period"));
    assert_eq!(api.call_count("GetMetricStatistics"), 1);
}

// =============================================================================
// Annotations
// =============================================================================

fn alarm(name: &str, statistic: Statistic) -> MetricAlarm {
    MetricAlarm {
        alarm_name: name.to_string(),
        namespace: Some("AWS/EC2".to_string()),
        metric_name: Some("CPUUtilization".to_string()),
        dimensions: vec![Dimension::new("InstanceId", "i-1")],
        statistic: Some(statistic),
        period: Some(300),
        alarm_actions: vec!["arn:aws:sns:us-east-1:1:pager".to_string()],
    }
}

fn state_update(alarm: &str, timestamp: i64) -> AlarmHistoryItem {
    AlarmHistoryItem {
        alarm_name: alarm.to_string(),
        timestamp,
        history_item_type: "StateUpdate".to_string(),
        history_summary: format!("{} changed state", alarm),
    }
}

#[tokio::test]
async fn test_annotations_both_modes() {
    let api = Arc::new(
        InMemoryCloudWatch::new()
            .with_alarm(alarm("cpu-high", Statistic::Maximum))
            .with_alarm(alarm("cpu-avg", Statistic::Average))
            .with_history(state_update("cpu-high", 1_000))
            .with_history(state_update("cpu-avg", 2_000)),
    );
    let executor = CloudWatchExecutor::new(
        datasource(),
        Arc::new(StaticClientFactory::new(api.clone())),
    );
    let range = TimeRange::new(0, 10_000).unwrap();

    let prefix = Query::new(
        "prefix",
        json!({
            "type": "annotationQuery",
            "prefixMatching": true,
            "actionPrefix": "arn:aws:sns",
            "alarmNamePrefix": "cpu-h"
        }),
    );
    let result = executor.execute_query(&prefix, range).await;
    assert!(!result.is_error(), "{:?}", result.error);
    assert_eq!(result.tables[0].rows.len(), 1);
    assert_eq!(result.tables[0].rows[0][1], json!("cpu-high"));
    assert_eq!(api.call_count("DescribeAlarms"), 1);

    let exact = Query::new(
        "exact",
        json!({
            "type": "annotationQuery",
            "region": "default",
            "namespace": "AWS/EC2",
            "metricName": "CPUUtilization",
            "dimensions": { "InstanceId": "i-1" },
            "statistics": ["Average", "Maximum"]
        }),
    );
    let result = executor.execute_query(&exact, range).await;
    let titles: Vec<_> = result.tables[0].rows.iter().map(|r| r[1].clone()).collect();
    assert_eq!(titles, vec![json!("cpu-avg"), json!("cpu-high")]);
    assert_eq!(api.call_count("DescribeAlarmsForMetric"), 2);
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_discovery_ttl_and_failed_refresh() {
    let api = Arc::new(InMemoryCloudWatch::new().with_metric_pages(
        "Custom/App",
        vec![
            vec![custom_metric("Requests", "Stage")],
            vec![custom_metric("Errors", "Host")],
        ],
    ));
    let factory = StaticClientFactory::new(api.clone());
    let cache = Arc::new(CustomMetricsCache::with_ttl(Duration::from_secs(300)));
    let service = MetadataService::new(
        StaticCatalog::embedded().unwrap(),
        cache.clone(),
        vec!["Custom/App".to_string()],
    );
    let info = datasource().with_namespace("Custom/App");

    let names = service.metrics(&info, &factory).await.unwrap();
    assert_eq!(names.len(), 2);
    assert_eq!(api.call_count("ListMetrics"), 2);

    // Within the TTL, served from memory
    tokio::time::advance(Duration::from_secs(299)).await;
    service.metrics(&info, &factory).await.unwrap();
    assert_eq!(api.call_count("ListMetrics"), 2);

    // Expired and the refresh fails: error surfaces, old entry survives
    tokio::time::advance(Duration::from_secs(2)).await;
    api.fail_operation("ListMetrics");
    assert!(service.metrics(&info, &factory).await.is_err());
    assert_eq!(
        cache.metric_name_cache().state(&info).await,
        EntryState::Stale
    );
    assert_eq!(
        cache.metric_name_cache().cached(&info).await.unwrap(),
        vec!["Requests", "Errors"]
    );

    // Recovery refreshes the entry
    api.clear_failures();
    service.metrics(&info, &factory).await.unwrap();
    assert_eq!(
        cache.metric_name_cache().state(&info).await,
        EntryState::Fresh
    );

    // Dimension keys keep their own entries
    let keys = service.dimension_keys(&info, &factory).await.unwrap();
    let keys: Vec<&str> = keys.iter().map(|k| k.value.as_str()).collect();
    assert_eq!(keys, vec!["Host", "Stage"]);
}
