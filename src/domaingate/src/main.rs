//! DomainGate: multi-tenant request gate with per-domain caching and rate
//! limiting.
//!
//! Main entry point that wires the components together and serves HTTP.

use clap::{Parser, ValueEnum};
use domaingate_api::ApiServer;
use domaingate_cache::CacheManager;
use domaingate_core::config::AppConfig;
use domaingate_platform::{DomainWhitelist, RateLimiter, TenantRegistry};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Parser, Debug)]
#[command(name = "domaingate")]
#[command(about = "Multi-tenant request gate with per-domain caching and rate limiting")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML). Defaults to ./domaingate.toml if present.
    #[arg(long, env = "DOMAINGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(long, env = "DOMAINGATE__API__HOST")]
    host: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DOMAINGATE__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Prometheus exporter port (overrides config)
    #[arg(long, env = "DOMAINGATE__METRICS__PORT")]
    metrics_port: Option<u16>,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    /// Do not start the Prometheus exporter
    #[arg(long, default_value_t = false)]
    no_metrics: bool,
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "domaingate=info,tower_http=info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!("DomainGate starting up");

    let mut config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) if cli.config.is_some() => return Err(e.into()),
        Err(e) => {
            warn!(error = %e, "Failed to load config, using defaults");
            AppConfig::default()
        }
    };

    if let Some(host) = cli.host {
        config.api.host = host;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(port) = cli.metrics_port {
        config.metrics.port = port;
    }
    if cli.no_metrics {
        config.metrics.enabled = false;
    }

    let registry = Arc::new(TenantRegistry::from_config(&config));
    for (domain, problems) in registry.validate() {
        warn!(domain = %domain, problems = ?problems, "Tenant configuration has problems");
    }

    let whitelist = Arc::new(DomainWhitelist::new(
        registry
            .enabled_domains()
            .into_iter()
            .chain(config.security.additional_whitelist.iter().cloned()),
        config.security.whitelist_enabled,
    ));
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    let tenants = registry.all();
    let overrides = limiter.sync_tenant_limits(tenants.iter().map(|c| c.as_ref()));
    let cache = Arc::new(CacheManager::new(&config.cache));
    cache.start_sweeper();

    info!(
        tenants = registry.len(),
        whitelisted = whitelist.len(),
        rate_limit_overrides = overrides,
        http_port = config.api.http_port,
        "Configuration loaded"
    );

    let metrics_enabled = config.metrics.enabled;
    let api_server = ApiServer::new(config, cache.clone(), limiter, whitelist, registry)
        .with_config_path(cli.config);

    if metrics_enabled {
        if let Err(e) = api_server.start_metrics().await {
            error!(error = %e, "Failed to start metrics exporter");
        }
    }

    info!("DomainGate is ready to serve traffic");

    let served = api_server.start_http(shutdown_signal()).await;

    let cleared = cache.shutdown().await;
    info!(cleared = cleared, "DomainGate stopped");

    served
}
