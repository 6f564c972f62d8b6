//! HTTP surface
//!
//! # Endpoints
//!
//! - `POST /api/tsdb/query` - Execute a batch of dashboard queries
//! - `POST /api/datasources/cloudwatch` - Datasource actions (raw CloudWatch
//!   calls and `__Get*` suggestions)
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics

pub mod handlers;
pub mod types;

use crate::actions::ActionDispatcher;
use crate::cache::CustomMetricsCache;
use crate::client::ClientFactory;
use crate::config::Config;
use crate::error::Result;
use crate::metadata::MetadataService;
use crate::query::{CloudWatchExecutor, ExecutorConfig};
use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

// =============================================================================
// Application State
// =============================================================================

/// Shared state behind every handler
pub struct AppState {
    /// Dashboard query executor
    pub executor: CloudWatchExecutor,
    /// Action dispatcher
    pub dispatcher: ActionDispatcher,
    /// Whether `/metrics` is served
    pub metrics_enabled: bool,
}

impl AppState {
    /// Wire executor, dispatcher and discovery cache from configuration
    pub fn from_config(config: &Config, clients: Arc<dyn ClientFactory>) -> Result<Self> {
        let base = config.datasource_info();
        let cache = Arc::new(CustomMetricsCache::with_ttl(config.discovery_ttl()));
        let metadata =
            MetadataService::new(config.load_catalog()?, cache, config.custom_namespaces());

        Ok(Self {
            executor: CloudWatchExecutor::with_config(
                base.clone(),
                clients.clone(),
                ExecutorConfig::new().with_timeout(config.query_timeout()),
            ),
            dispatcher: ActionDispatcher::new(base, clients, metadata)
                .with_timeout(config.query_timeout()),
            metrics_enabled: config.monitoring.metrics_enabled,
        })
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build CORS layer from configuration
pub fn build_cors_layer(cors_origins: &[String]) -> CorsLayer {
    if cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|o| o.parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any)
    }
}

/// Build the application router
pub fn build_router(state: Arc<AppState>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route("/api/tsdb/query", post(handlers::query))
        .route("/api/datasources/cloudwatch", post(handlers::action))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(cors_origins))
}
