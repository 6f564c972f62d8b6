//! Static catalog of built-in namespaces
//!
//! Built-in (`AWS/`-prefixed) namespaces resolve their metric names and
//! dimension keys from a JSON document loaded once at startup:
//!
//! ```json
//! { "metrics": { "AWS/EC2": ["CPUUtilization"] }, "dimensions": { "AWS/EC2": ["InstanceId"] } }
//! ```
//!
//! A default document ships embedded in the crate. Custom namespaces never
//! touch the catalog; they go through the discovery cache instead.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Namespaces with this prefix are built in
pub const BUILTIN_NAMESPACE_PREFIX: &str = "AWS/";

/// Regions offered for selection
pub const REGIONS: &[&str] = &[
    "ap-northeast-1",
    "ap-northeast-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ca-central-1",
    "cn-north-1",
    "eu-central-1",
    "eu-west-1",
    "eu-west-2",
    "sa-east-1",
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "us-gov-west-1",
];

const EMBEDDED_CATALOG: &str = include_str!("../data/catalog.json");

/// True for namespaces that need live discovery
pub fn is_custom_namespace(namespace: &str) -> bool {
    !namespace.starts_with(BUILTIN_NAMESPACE_PREFIX)
}

/// Built-in namespace → metric names / dimension keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    metrics: HashMap<String, Vec<String>>,
    #[serde(default)]
    dimensions: HashMap<String, Vec<String>>,
}

impl StaticCatalog {
    /// The catalog embedded in the crate
    pub fn embedded() -> Result<Self> {
        Self::from_json_str(EMBEDDED_CATALOG)
    }

    /// Parse a catalog document
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid catalog document: {}", e)))
    }

    /// Load a catalog document from disk
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Metric names of a built-in namespace
    pub fn metric_names(&self, namespace: &str) -> Result<&[String]> {
        self.metrics
            .get(namespace)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NotFound(format!("Unable to find namespace {}", namespace)))
    }

    /// Dimension keys of a built-in namespace
    pub fn dimension_keys(&self, namespace: &str) -> Result<&[String]> {
        self.dimensions
            .get(namespace)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NotFound(format!("Unable to find dimension {}", namespace)))
    }

    /// Every namespace with a metric list, unordered
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.metrics.keys().map(String::as_str)
    }
}
