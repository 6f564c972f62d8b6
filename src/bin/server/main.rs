//! Kuba CloudWatch HTTP Server
//!
//! Serves the CloudWatch datasource backend over HTTP.
//!
//! # Endpoints
//!
//! - `POST /api/tsdb/query` - Execute dashboard queries
//! - `POST /api/datasources/cloudwatch` - Datasource actions
//! - `GET /health` - Health check
//! - `GET /metrics` - Prometheus metrics
//!
//! # CLI Commands
//!
//! - `start` - Start the HTTP server (default if no command specified)
//! - `check-config` - Validate configuration file
//!
//! # Configuration
//!
//! The server reads configuration from:
//! 1. `KUBA_CW_CONFIG` environment variable (path to TOML file)
//! 2. `./cloudwatch.toml` in current directory
//! 3. Default configuration

use clap::{Parser, Subcommand};
use kuba_cloudwatch::{
    api::{build_router, AppState},
    client::aws::AwsClientFactory,
    config::Config,
    metrics,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{debug, info, warn};

/// Graceful shutdown signal handler
///
/// Signal registration failures are logged and the handler then waits
/// forever; the process has to be killed.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {},
            Err(e) => {
                warn!(
                    error = %e,
                    "Ctrl+C handler installation failed - graceful shutdown unavailable"
                );
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                warn!(
                    error = %e,
                    "SIGTERM handler installation failed - SIGTERM shutdown unavailable"
                );
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

// =============================================================================
// CLI Definition
// =============================================================================

/// Kuba CloudWatch - CloudWatch datasource backend
#[derive(Parser)]
#[command(name = "kuba-cloudwatch")]
#[command(version)]
#[command(about = "CloudWatch datasource backend for dashboards", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to configuration file (overrides KUBA_CW_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    /// Override listen address (e.g., 0.0.0.0:8080)
    #[arg(short, long, global = true)]
    listen: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Start,

    /// Validate configuration file without starting the server
    CheckConfig,
}

/// Load configuration, honoring the CLI path and listen overrides
fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file_with_env(path)?,
        None => Config::load()?,
    };
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Validate configuration and print summary
fn cmd_check_config(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let catalog = config.load_catalog()?;

    println!("Configuration is valid!");
    println!();
    println!("Server Settings:");
    println!("  Listen address: {}", config.server.listen_addr);
    println!();
    println!("Datasource Settings:");
    println!("  Profile: {}", config.datasource.profile);
    println!("  Default region: {}", config.datasource.default_region);
    println!(
        "  Assume role: {}",
        config.datasource.assume_role_arn.as_deref().unwrap_or("-")
    );
    println!("  Custom namespaces: {:?}", config.custom_namespaces());
    println!("  Query timeout: {:?}", config.query_timeout());
    println!();
    println!("Discovery:");
    println!("  TTL: {:?}", config.discovery_ttl());
    println!("  Catalog namespaces: {}", catalog.namespaces().count());
    println!();
    println!("Monitoring:");
    println!("  Prometheus enabled: {}", config.monitoring.metrics_enabled);
    println!("  Log level: {}", config.monitoring.log_level);

    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => return cmd_check_config(&cli),
        Some(Commands::Start) | None => {},
    }

    let config = load_config(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.monitoring.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    info!(
        "Starting Kuba CloudWatch Server v{}",
        env!("CARGO_PKG_VERSION")
    );
    debug!(
        listen_addr = %config.server.listen_addr,
        datasource = ?config.datasource_info(),
        "Configuration loaded"
    );

    if config.monitoring.metrics_enabled {
        metrics::init();
    }

    let state = Arc::new(AppState::from_config(
        &config,
        Arc::new(AwsClientFactory::new()),
    )?);
    let app = build_router(state, &config.server.cors_allowed_origins);

    let addr: SocketAddr = config.server.listen_addr.parse()?;
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
