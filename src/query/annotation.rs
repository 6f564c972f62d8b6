//! Alarm annotations
//!
//! Resolves alarms and turns their history into annotation events. Two modes,
//! selected by the model's `prefixMatching` flag:
//!
//! - **Prefix**: alarms whose action ARN and name start with the given
//!   prefixes (empty matches all, at most 100), then narrowed by whichever of
//!   namespace, metric, dimensions, statistics and period the caller gave.
//! - **Exact**: alarms attached to the exact metric stream, one lookup per
//!   requested statistic. Region, namespace, metric and at least one
//!   statistic are required; if any is missing the result is empty and no
//!   remote call is made.
//!
//! Every history item of every matched alarm within the window becomes one
//! event, in the order the service returned them.

use crate::client::{ClientFactory, MetricsClient};
use crate::error::{ParseError, UpstreamError};
use crate::query::parser::{as_object, optional_string, parse_dimensions, parse_period};
use crate::query::result::Table;
use crate::query::statistic::classify_value;
use crate::types::{AlarmFilter, DatasourceInfo, Dimension, MetricAlarm, Statistic, TimeRange};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Maximum alarms returned by a prefix lookup
pub const PREFIX_MATCH_MAX_RECORDS: u32 = 100;

/// Period used by exact-mode lookups when the model gives none
pub const DEFAULT_ALARM_PERIOD_SECS: u32 = 300;

/// Parsed annotation query model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationQuery {
    /// Prefix mode when true, exact mode otherwise
    pub prefix_matching: bool,
    /// Region (`default` or empty resolves to the datasource region)
    pub region: String,
    /// Metric namespace
    pub namespace: String,
    /// Metric name
    pub metric_name: String,
    /// Metric dimensions
    pub dimensions: Vec<Dimension>,
    /// Standard then extended statistics
    pub statistics: Vec<Statistic>,
    /// Alarm period in seconds
    pub period: Option<u32>,
    /// Action ARN prefix (prefix mode)
    pub action_prefix: String,
    /// Alarm name prefix (prefix mode)
    pub alarm_name_prefix: String,
}

impl AnnotationQuery {
    /// True when exact mode lacks what it needs to look anything up
    pub fn is_incomplete(&self) -> bool {
        !self.prefix_matching
            && (self.region.is_empty()
                || self.namespace.is_empty()
                || self.metric_name.is_empty()
                || self.statistics.is_empty())
    }
}

/// Parse an annotation query model
///
/// Every field is optional; type errors still fail the parse.
pub fn parse_annotation_query(model: &Value) -> Result<AnnotationQuery, ParseError> {
    let model = as_object(model)?;

    let prefix_matching = match model.get("prefixMatching") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(ParseError::InvalidType {
                field: "prefixMatching".to_string(),
                expected: "boolean",
            })
        }
    };

    let mut statistics = classify_value(model.get("statistics"))?.all();
    for extended in classify_value(model.get("extendedStatistics"))?.all() {
        if !statistics.contains(&extended) {
            statistics.push(extended);
        }
    }

    let period = parse_period(model.get("period"))?;

    Ok(AnnotationQuery {
        prefix_matching,
        region: optional_string(model, "region")?,
        namespace: optional_string(model, "namespace")?,
        metric_name: optional_string(model, "metricName")?,
        dimensions: parse_dimensions(model.get("dimensions"))?,
        statistics,
        period: if prefix_matching {
            period
        } else {
            Some(period.unwrap_or(DEFAULT_ALARM_PERIOD_SECS))
        },
        action_prefix: optional_string(model, "actionPrefix")?,
        alarm_name_prefix: optional_string(model, "alarmNamePrefix")?,
    })
}

/// One annotation derived from an alarm history item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationEvent {
    /// Event time in milliseconds since epoch
    pub time: i64,
    /// Alarm name
    pub title: String,
    /// History item type
    pub tags: Vec<String>,
    /// History summary
    pub text: String,
}

/// Resolve alarms and collect their history as annotation events
pub async fn execute_annotation_query(
    query: &AnnotationQuery,
    range: TimeRange,
    base: &DatasourceInfo,
    clients: &dyn ClientFactory,
) -> crate::Result<Vec<AnnotationEvent>> {
    if query.is_incomplete() {
        debug!("Exact-mode annotation query incomplete, returning no events");
        return Ok(Vec::new());
    }

    let client = clients.connect(&base.for_request_region(&query.region)).await?;
    let alarms = find_alarms(&client, query).await?;
    Ok(collect_events(&client, &alarms, range).await?)
}

/// Alarms matched by the query
pub async fn find_alarms(
    client: &MetricsClient,
    query: &AnnotationQuery,
) -> Result<Vec<MetricAlarm>, UpstreamError> {
    if query.prefix_matching {
        let alarms = client
            .list_alarms(&AlarmFilter::Prefix {
                action_prefix: query.action_prefix.clone(),
                alarm_name_prefix: query.alarm_name_prefix.clone(),
                max_records: PREFIX_MATCH_MAX_RECORDS,
            })
            .await?;
        return Ok(filter_alarms(alarms, query));
    }

    let mut alarms = Vec::new();
    for statistic in &query.statistics {
        let found = client
            .list_alarms(&AlarmFilter::Metric {
                namespace: query.namespace.clone(),
                metric_name: query.metric_name.clone(),
                dimensions: query.dimensions.clone(),
                statistic: Some(statistic.clone()),
                period: query.period,
            })
            .await?;
        alarms.extend(found);
    }
    Ok(alarms)
}

/// Narrow prefix-mode alarms by the metric criteria the caller supplied
pub fn filter_alarms(alarms: Vec<MetricAlarm>, query: &AnnotationQuery) -> Vec<MetricAlarm> {
    let mut wanted_dimensions = query.dimensions.clone();
    wanted_dimensions.sort_by(|a, b| a.name.cmp(&b.name));

    alarms
        .into_iter()
        .filter(|alarm| {
            if !query.namespace.is_empty()
                && alarm.namespace.as_deref() != Some(query.namespace.as_str())
            {
                return false;
            }
            if !query.metric_name.is_empty()
                && alarm.metric_name.as_deref() != Some(query.metric_name.as_str())
            {
                return false;
            }
            if !wanted_dimensions.is_empty() {
                let mut dimensions = alarm.dimensions.clone();
                dimensions.sort_by(|a, b| a.name.cmp(&b.name));
                if dimensions != wanted_dimensions {
                    return false;
                }
            }
            if !query.statistics.is_empty() {
                match &alarm.statistic {
                    Some(statistic) if query.statistics.contains(statistic) => {}
                    _ => return false,
                }
            }
            if let Some(period) = query.period {
                if alarm.period != Some(period) {
                    return false;
                }
            }
            true
        })
        .collect()
}

async fn collect_events(
    client: &MetricsClient,
    alarms: &[MetricAlarm],
    range: TimeRange,
) -> Result<Vec<AnnotationEvent>, UpstreamError> {
    let mut events = Vec::new();
    for alarm in alarms {
        let history = client.alarm_history(&alarm.alarm_name, None, range).await?;
        events.extend(history.into_iter().map(|item| AnnotationEvent {
            time: item.timestamp,
            title: item.alarm_name,
            tags: vec![item.history_item_type],
            text: item.history_summary,
        }));
    }
    debug!(alarms = alarms.len(), events = events.len(), "Collected alarm history");
    Ok(events)
}

/// Table with columns `time`, `title`, `tags`, `text`
pub fn events_to_table(events: &[AnnotationEvent]) -> Table {
    let mut table = Table::with_columns(&["time", "title", "tags", "text"]);
    table.rows = events
        .iter()
        .map(|e| vec![json!(e.time), json!(e.title), json!(e.tags), json!(e.text)])
        .collect();
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::stubs::InMemoryCloudWatch;
    use crate::client::StaticClientFactory;
    use crate::types::AlarmHistoryItem;
    use std::sync::Arc;

    fn alarm(name: &str, statistic: &str, period: u32) -> MetricAlarm {
        MetricAlarm {
            alarm_name: name.to_string(),
            namespace: Some("AWS/EC2".to_string()),
            metric_name: Some("CPUUtilization".to_string()),
            dimensions: vec![
                Dimension::new("InstanceId", "i-1"),
                Dimension::new("AutoScalingGroupName", "asg"),
            ],
            statistic: Some(Statistic::parse(statistic)),
            period: Some(period),
            alarm_actions: vec!["arn:aws:sns:us-east-1:1:ops".to_string()],
        }
    }

    fn history(alarm: &str, ts: i64, summary: &str) -> AlarmHistoryItem {
        AlarmHistoryItem {
            alarm_name: alarm.to_string(),
            timestamp: ts,
            history_item_type: "StateUpdate".to_string(),
            history_summary: summary.to_string(),
        }
    }

    #[test]
    fn test_parse_modes() {
        let exact = parse_annotation_query(&json!({
            "region": "us-east-1",
            "namespace": "AWS/EC2",
            "metricName": "CPUUtilization",
            "statistics": ["Average", "p99.00"]
        }))
        .unwrap();
        assert!(!exact.prefix_matching);
        assert_eq!(exact.period, Some(300));
        assert_eq!(exact.statistics.len(), 2);
        assert!(!exact.is_incomplete());

        let prefix = parse_annotation_query(&json!({
            "prefixMatching": true,
            "actionPrefix": "arn:aws:sns",
        }))
        .unwrap();
        assert!(prefix.prefix_matching);
        assert_eq!(prefix.period, None);
        assert!(!prefix.is_incomplete());

        let err = parse_annotation_query(&json!({ "prefixMatching": "yes" })).unwrap_err();
        assert_eq!(err.field(), "prefixMatching");
    }

    #[tokio::test]
    async fn test_exact_mode_without_statistics_makes_no_call() {
        let api = Arc::new(InMemoryCloudWatch::new().with_alarm(alarm("cpu", "Average", 300)));
        let factory = StaticClientFactory::new(api.clone());
        let query = parse_annotation_query(&json!({
            "region": "us-east-1",
            "namespace": "AWS/EC2",
            "metricName": "CPUUtilization",
            "statistics": []
        }))
        .unwrap();

        let events = execute_annotation_query(
            &query,
            TimeRange::new(0, 1_000).unwrap(),
            &DatasourceInfo::new("default", "us-east-1"),
            &factory,
        )
        .await
        .unwrap();

        assert!(events.is_empty());
        assert!(api.calls().is_empty());
        assert!(factory.connected_regions().is_empty());
    }

    #[tokio::test]
    async fn test_exact_mode_events_in_upstream_order() {
        let api = Arc::new(
            InMemoryCloudWatch::new()
                .with_alarm(alarm("cpu-avg", "Average", 300))
                .with_alarm(alarm("cpu-max", "Maximum", 300))
                .with_history(history("cpu-avg", 500, "OK to ALARM"))
                .with_history(history("cpu-avg", 100, "ALARM to OK"))
                .with_history(history("cpu-max", 300, "OK to ALARM"))
                .with_history(history("cpu-max", 5_000, "outside window")),
        );
        let factory = StaticClientFactory::new(api.clone());
        let query = parse_annotation_query(&json!({
            "region": "default",
            "namespace": "AWS/EC2",
            "metricName": "CPUUtilization",
            "dimensions": { "InstanceId": "i-1", "AutoScalingGroupName": "asg" },
            "statistics": ["Average", "Maximum"]
        }))
        .unwrap();

        let events = execute_annotation_query(
            &query,
            TimeRange::new(0, 1_000).unwrap(),
            &DatasourceInfo::new("default", "eu-west-1"),
            &factory,
        )
        .await
        .unwrap();

        let times: Vec<i64> = events.iter().map(|e| e.time).collect();
        assert_eq!(times, vec![500, 100, 300]);
        assert_eq!(events[0].title, "cpu-avg");
        assert_eq!(events[0].tags, vec!["StateUpdate"]);
        assert_eq!(events[2].text, "OK to ALARM");
        assert_eq!(api.call_count("DescribeAlarmsForMetric"), 2);
        assert_eq!(factory.connected_regions(), vec!["eu-west-1"]);
    }

    #[tokio::test]
    async fn test_prefix_mode_filters_listing() {
        let api = Arc::new(
            InMemoryCloudWatch::new()
                .with_alarm(alarm("cpu-avg", "Average", 300))
                .with_alarm(alarm("cpu-avg-60", "Average", 60))
                .with_alarm(alarm("cpu-sum", "Sum", 300)),
        );
        let client = MetricsClient::new(api.clone(), "us-east-1");
        let query = parse_annotation_query(&json!({
            "prefixMatching": true,
            "alarmNamePrefix": "cpu",
            "namespace": "AWS/EC2",
            "dimensions": { "AutoScalingGroupName": "asg", "InstanceId": "i-1" },
            "statistics": ["Average"],
            "period": "300"
        }))
        .unwrap();

        let alarms = find_alarms(&client, &query).await.unwrap();
        let names: Vec<&str> = alarms.iter().map(|a| a.alarm_name.as_str()).collect();
        assert_eq!(names, vec!["cpu-avg"]);
        assert_eq!(api.call_count("DescribeAlarms"), 1);
    }

    #[test]
    fn test_filter_skips_unsupplied_criteria() {
        let query = AnnotationQuery {
            prefix_matching: true,
            ..Default::default()
        };
        let alarms = vec![alarm("a", "Average", 60), alarm("b", "p99", 300)];
        assert_eq!(filter_alarms(alarms, &query).len(), 2);
    }

    #[test]
    fn test_events_to_table() {
        let events = vec![AnnotationEvent {
            time: 1_000,
            title: "cpu".to_string(),
            tags: vec!["StateUpdate".to_string()],
            text: "OK to ALARM".to_string(),
        }];
        let table = events_to_table(&events);
        let columns: Vec<&str> = table.columns.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(columns, vec!["time", "title", "tags", "text"]);
        assert_eq!(table.rows[0][0], json!(1_000));
        assert_eq!(table.rows[0][2], json!(["StateUpdate"]));
    }
}
