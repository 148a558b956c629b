//! Tenant-facing and operational REST handlers.

use crate::error::ApiError;
use crate::middleware::Tenant;
use crate::resolver::DomainSource;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use domaingate_cache::{CacheManager, CacheStats};
use domaingate_core::TenantConfigProvider;
use domaingate_platform::{DomainWhitelist, RateLimitStats, RateLimiter, TenantRegistry};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    pub limiter: Arc<RateLimiter>,
    pub whitelist: Arc<DomainWhitelist>,
    pub registry: Arc<TenantRegistry>,
    /// Source re-read by the configuration reload route.
    pub config_path: Option<PathBuf>,
    pub start_time: Instant,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub tenants: usize,
    pub cached_entries: usize,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct DomainInfoResponse {
    pub domain: String,
    pub client_name: String,
    pub data_source_id: String,
    pub cache_timeout_secs: u64,
    pub uses_default_config: bool,
    pub resolved_from: DomainSource,
    pub cache: CacheStats,
    pub rate_limit: RateLimitStats,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        tenants: state.registry.len(),
        cached_entries: state.cache.total_entry_count(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready. Ready once at least one tenant or a default is configured.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if !state.registry.is_empty() || state.registry.default_config().is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /api/domain-info: the caller's tenant, as resolved by the gate.
pub async fn domain_info(
    State(state): State<AppState>,
    Tenant(ctx): Tenant,
) -> Result<Json<DomainInfoResponse>, ApiError> {
    let cache = ctx.cache.stats()?;
    let rate_limit = state.limiter.stats(ctx.tenant.as_str())?;

    Ok(Json(DomainInfoResponse {
        domain: ctx.tenant.to_string(),
        client_name: ctx.config.client_name.clone(),
        data_source_id: ctx.config.data_source_id.clone(),
        cache_timeout_secs: ctx.config.cache_timeout_secs,
        uses_default_config: ctx.uses_default,
        resolved_from: ctx.source,
        cache,
        rate_limit,
    }))
}
