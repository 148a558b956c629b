//! API server: tenant-gated REST, admin REST, and the metrics listener.

use crate::admin_rest;
use crate::gate::RequestGate;
use crate::middleware::{domain_gate, GateState};
use crate::rest::{self, AppState};
use axum::routing::{delete, get, post};
use axum::{middleware, Router};
use domaingate_cache::CacheManager;
use domaingate_core::config::AppConfig;
use domaingate_platform::{DomainWhitelist, RateLimiter, TenantRegistry};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Build the full router. Everything outside `/api/admin` passes through the
/// domain gate unless its path is exempt.
pub fn build_router(state: AppState, gate: GateState) -> Router {
    let tenant_routes = Router::new()
        .route("/health", get(rest::health_check))
        .route("/ping", get(rest::ping))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .route("/api/domain-info", get(rest::domain_info))
        .layer(middleware::from_fn_with_state(gate, domain_gate));

    let admin_routes = Router::new()
        .route("/api/admin/domains", get(admin_rest::list_domains))
        .route("/api/admin/domains/:domain/status", get(admin_rest::domain_status))
        .route("/api/admin/cache/stats", get(admin_rest::cache_stats))
        .route("/api/admin/cache/stats/:domain", get(admin_rest::domain_cache_stats))
        .route("/api/admin/cache/clear", post(admin_rest::clear_cache))
        .route(
            "/api/admin/whitelist",
            get(admin_rest::whitelist).post(admin_rest::add_to_whitelist),
        )
        .route("/api/admin/whitelist/:domain", delete(admin_rest::remove_from_whitelist))
        .route(
            "/api/admin/rate-limits/:domain/reset",
            post(admin_rest::reset_rate_limits),
        )
        .route("/api/admin/rate-limits/:domain", get(admin_rest::rate_limit_stats))
        .route("/api/admin/config/reload", post(admin_rest::reload_config))
        .route("/api/admin/config/validate", post(admin_rest::validate_config));

    Router::new()
        .merge(tenant_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Owns the shared components and serves them over HTTP.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
    gate: GateState,
}

impl ApiServer {
    pub fn new(
        config: AppConfig,
        cache: Arc<CacheManager>,
        limiter: Arc<RateLimiter>,
        whitelist: Arc<DomainWhitelist>,
        registry: Arc<TenantRegistry>,
    ) -> Self {
        let gate = RequestGate::new(
            registry.clone(),
            whitelist.clone(),
            limiter.clone(),
            cache.clone(),
        );
        let gate = GateState::new(Arc::new(gate), config.security.exempt_paths.clone());
        let state = AppState {
            cache,
            limiter,
            whitelist,
            registry,
            config_path: None,
            start_time: Instant::now(),
        };
        Self {
            config,
            state,
            gate,
        }
    }

    /// File the admin reload route re-reads. `None` falls back to
    /// `./domaingate.toml` and the environment.
    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.state.config_path = path;
        self
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), self.gate.clone())
    }

    /// Serve HTTP until `shutdown` resolves.
    pub async fn start_http<F>(&self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        info!("HTTP server stopped");
        Ok(())
    }

    /// Install the Prometheus recorder and its scrape listener.
    pub async fn start_metrics(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.metrics.port);
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
