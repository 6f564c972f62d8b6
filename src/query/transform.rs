//! Response transformer
//!
//! Folds one GetMetricStatistics answer into one series per requested
//! statistic (standard first, then extended, each in requested order). Every
//! series of a query carries the same dimension tags.
//!
//! Point values per statistic:
//!
//! - standard aggregates read the like-named datapoint field; a missing value
//!   becomes a null point
//! - extended statistics read the datapoint's extended map; a missing entry
//!   skips the point
//!
//! Points come out in ascending timestamp order.
//!
//! # Legend templates
//!
//! `{{token}}` placeholders are substituted from the query: `metric`, `stat`,
//! `namespace`, `region`, `period`, `label` and any dimension name. Unknown
//! tokens are replaced by their bare name. An empty template yields the
//! default name `<label>_<stat>`.

use crate::query::parser::QueryDescriptor;
use crate::query::result::{TimePoint, TimeSeries};
use crate::types::{Datapoint, Statistic, StatisticsResponse};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::BTreeMap;

lazy_static! {
    static ref LEGEND_TOKEN: Regex = Regex::new(r"\{\{\s*(.+?)\s*\}\}").unwrap();
}

/// Build one series per requested statistic
pub fn transform_response(response: &StatisticsResponse, query: &QueryDescriptor) -> Vec<TimeSeries> {
    let label = response
        .label
        .as_deref()
        .filter(|l| !l.is_empty())
        .unwrap_or(&query.metric_name);

    let tags: BTreeMap<String, String> = query
        .dimensions
        .iter()
        .map(|d| (d.name.clone(), d.value.clone()))
        .collect();

    let mut datapoints: Vec<&Datapoint> = response.datapoints.iter().collect();
    datapoints.sort_by_key(|dp| dp.timestamp);

    query
        .requested_statistics()
        .iter()
        .map(|statistic| TimeSeries {
            name: series_name(query, statistic, label),
            tags: tags.clone(),
            points: points_for(&datapoints, statistic),
        })
        .collect()
}

fn points_for(datapoints: &[&Datapoint], statistic: &Statistic) -> Vec<TimePoint> {
    datapoints
        .iter()
        .filter_map(|dp| {
            let value = dp.value(statistic);
            if value.is_none() && !statistic.is_standard() {
                return None;
            }
            Some(TimePoint::new(dp.timestamp, value))
        })
        .collect()
}

/// Display name of the series for `statistic`
pub fn series_name(query: &QueryDescriptor, statistic: &Statistic, label: &str) -> String {
    if query.legend_format.is_empty() {
        return format!("{}_{}", label, statistic);
    }
    format_legend(&query.legend_format, query, statistic, label)
}

/// Substitute `{{token}}` placeholders in `template`
pub fn format_legend(
    template: &str,
    query: &QueryDescriptor,
    statistic: &Statistic,
    label: &str,
) -> String {
    LEGEND_TOKEN
        .replace_all(template, |caps: &Captures| {
            let token = &caps[1];
            match token {
                "metric" => query.metric_name.clone(),
                "stat" => statistic.to_string(),
                "namespace" => query.namespace.clone(),
                "region" => query.region.clone(),
                "period" => query.period.to_string(),
                "label" => label.to_string(),
                _ => query
                    .dimensions
                    .iter()
                    .find(|d| d.name == token)
                    .map(|d| d.value.clone())
                    .unwrap_or_else(|| token.to_string()),
            }
        })
        .into_owned()
}
