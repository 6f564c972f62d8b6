//! Configuration management for the CloudWatch datasource
//!
//! TOML configuration file with environment variable overrides and sensible
//! defaults. The file is looked up at `$KUBA_CW_CONFIG`, then
//! `./cloudwatch.toml`; without either, defaults apply.

use crate::catalog::StaticCatalog;
use crate::error::{Error, Result};
use crate::types::DatasourceInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "KUBA_CW_CONFIG";

/// Config file used when `KUBA_CW_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "cloudwatch.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// CloudWatch datasource settings
    #[serde(default)]
    pub datasource: DatasourceConfig,

    /// Custom-metric discovery cache
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Built-in namespace catalog
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Monitoring and observability
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Listen address (`host:port`)
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins (empty allows any)
    #[serde(default)]
    pub cors_allowed_origins: Vec<String>,
}

/// Datasource configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasourceConfig {
    /// Credential profile name (empty uses the default chain)
    #[serde(default)]
    pub profile: String,

    /// Region used when a query asks for `default`
    #[serde(default = "default_region")]
    pub default_region: String,

    /// Role to assume before calling CloudWatch
    #[serde(default)]
    pub assume_role_arn: Option<String>,

    /// Static access key id
    #[serde(default)]
    pub access_key: Option<String>,

    /// Static secret access key
    #[serde(default)]
    pub secret_key: Option<String>,

    /// Comma separated custom namespaces offered for selection
    #[serde(default)]
    pub custom_metrics_namespaces: String,

    /// Upper bound on one query or action in seconds
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
}

/// Discovery cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Entry lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

/// Catalog configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// Catalog JSON document; the embedded catalog is used when unset
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    /// Enable Prometheus metrics endpoint
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_listen_addr() -> String { "0.0.0.0:3030".to_string() }
fn default_region() -> String { "us-east-1".to_string() }
fn default_query_timeout_secs() -> u64 { 30 }
fn default_ttl_secs() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_true() -> bool { true }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Default for DatasourceConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            default_region: default_region(),
            assume_role_arn: None,
            access_key: None,
            secret_key: None,
            custom_metrics_namespaces: String::new(),
            query_timeout_secs: default_query_timeout_secs(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        toml::from_str(&contents).map_err(|e| {
            Error::Configuration(format!("Failed to parse config file {}: {}", path.display(), e))
        })
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from environment variables only
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    /// Load from `$KUBA_CW_CONFIG`, `./cloudwatch.toml` or defaults, then
    /// apply environment overrides
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file_with_env(path);
        }
        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            return Self::from_file_with_env(DEFAULT_CONFIG_PATH);
        }
        Ok(Self::from_env())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup`, keyed by environment variable name
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server
        if let Some(addr) = lookup("KUBA_CW_LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }

        // Datasource
        if let Some(profile) = lookup("KUBA_CW_PROFILE") {
            self.datasource.profile = profile;
        }
        if let Some(region) = lookup("KUBA_CW_REGION").or_else(|| lookup("AWS_REGION")) {
            self.datasource.default_region = region;
        }
        if let Some(arn) = lookup("KUBA_CW_ASSUME_ROLE_ARN") {
            self.datasource.assume_role_arn = Some(arn);
        }
        if let Some(namespaces) = lookup("KUBA_CW_CUSTOM_NAMESPACES") {
            self.datasource.custom_metrics_namespaces = namespaces;
        }

        // Discovery
        if let Some(ttl) = lookup("KUBA_CW_DISCOVERY_TTL_SECS") {
            if let Ok(t) = ttl.parse() {
                self.discovery.ttl_secs = t;
            }
        }

        // Monitoring
        if let Some(log_level) = lookup("RUST_LOG") {
            self.monitoring.log_level = log_level;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.listen_addr.trim().is_empty() {
            return Err(Error::Configuration("Listen address cannot be empty".to_string()));
        }

        if self.datasource.default_region.trim().is_empty() {
            return Err(Error::Configuration("Default region cannot be empty".to_string()));
        }

        if self.discovery.ttl_secs == 0 {
            return Err(Error::Configuration("Discovery TTL must be > 0".to_string()));
        }

        if self.datasource.query_timeout_secs == 0 {
            return Err(Error::Configuration("Query timeout must be > 0".to_string()));
        }

        if self.datasource.access_key.is_some() != self.datasource.secret_key.is_some() {
            return Err(Error::Configuration(
                "access_key and secret_key must be set together".to_string(),
            ));
        }

        Ok(())
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Configuration(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, contents).map_err(|e| {
            Error::Configuration(format!("Failed to write config file {}: {}", path.display(), e))
        })
    }

    /// Datasource info for the configured profile and default region
    pub fn datasource_info(&self) -> DatasourceInfo {
        DatasourceInfo {
            assume_role_arn: self.datasource.assume_role_arn.clone(),
            access_key: self.datasource.access_key.clone(),
            secret_key: self.datasource.secret_key.clone(),
            ..DatasourceInfo::new(
                self.datasource.profile.clone(),
                self.datasource.default_region.clone(),
            )
        }
    }

    /// Configured custom namespaces, trimmed, blanks dropped
    pub fn custom_namespaces(&self) -> Vec<String> {
        self.datasource
            .custom_metrics_namespaces
            .split(',')
            .map(str::trim)
            .filter(|ns| !ns.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Discovery entry lifetime
    pub fn discovery_ttl(&self) -> Duration {
        Duration::from_secs(self.discovery.ttl_secs)
    }

    /// Upper bound on one query
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.datasource.query_timeout_secs)
    }

    /// The configured catalog, or the embedded one
    pub fn load_catalog(&self) -> Result<StaticCatalog> {
        match &self.catalog.path {
            Some(path) => StaticCatalog::from_file(path),
            None => StaticCatalog::embedded(),
        }
    }
}
