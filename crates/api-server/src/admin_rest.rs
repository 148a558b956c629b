//! Administrative REST handlers. These act out of band and are not gated
//! by tenant resolution.

use crate::error::ApiError;
use crate::rest::AppState;
use axum::extract::{Path, State};
use axum::Json;
use domaingate_cache::CacheStats;
use domaingate_core::{AppConfig, GateError, GateResult, TenantConfigProvider, TenantId};
use domaingate_platform::RateLimitStats;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

#[derive(Serialize)]
pub struct DomainSummary {
    pub domain: String,
    pub client_name: String,
    pub enabled: bool,
    pub cache_timeout_secs: u64,
    pub whitelisted: bool,
    pub cached_entries: usize,
}

#[derive(Serialize)]
pub struct DomainListResponse {
    pub domains: Vec<DomainSummary>,
    pub has_default: bool,
    pub configuration_errors: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
pub struct DomainStatusResponse {
    pub domain: String,
    pub configured: bool,
    pub enabled: bool,
    pub whitelisted: bool,
    pub cache: CacheStats,
    pub rate_limit: RateLimitStats,
}

#[derive(Serialize)]
pub struct CacheStatsResponse {
    pub total_entries: usize,
    pub domains: BTreeMap<String, CacheStats>,
}

#[derive(Serialize)]
pub struct DomainCacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    /// Hashed keys currently held.
    pub keys: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClearCacheRequest {
    /// Absent clears every tenant.
    #[serde(default)]
    pub domain: Option<String>,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub cleared: usize,
    pub domains: Vec<String>,
}

#[derive(Serialize)]
pub struct WhitelistResponse {
    pub enabled: bool,
    pub domains: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistRequest {
    pub domain: String,
}

#[derive(Serialize)]
pub struct WhitelistChangeResponse {
    pub domain: String,
    pub changed: bool,
}

#[derive(Serialize)]
pub struct ReloadResponse {
    pub tenants: usize,
    pub added_domains: Vec<String>,
    pub removed_domains: Vec<String>,
    pub whitelisted: usize,
    pub rate_limit_overrides: usize,
    pub configuration_errors: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    pub tenants: usize,
    pub has_default: bool,
    pub errors: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize)]
pub struct RateLimitResetResponse {
    pub domain: String,
    pub reset: bool,
}

fn domain_param(raw: &str) -> GateResult<TenantId> {
    TenantId::parse_domain(raw)
}

/// GET /api/admin/domains
pub async fn list_domains(State(state): State<AppState>) -> Result<Json<DomainListResponse>, ApiError> {
    let mut domains = Vec::new();
    for config in state.registry.all() {
        domains.push(DomainSummary {
            domain: config.domain.clone(),
            client_name: config.client_name.clone(),
            enabled: config.enabled,
            cache_timeout_secs: config.cache_timeout_secs,
            whitelisted: state.whitelist.is_allowed(&config.domain),
            cached_entries: state.cache.domain_entry_count(&config.domain)?,
        });
    }

    Ok(Json(DomainListResponse {
        domains,
        has_default: state.registry.default_config().is_some(),
        configuration_errors: state.registry.validate(),
    }))
}

/// GET /api/admin/domains/:domain/status
pub async fn domain_status(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<DomainStatusResponse>, ApiError> {
    let tenant = domain_param(&domain)?;
    let config = state.registry.get(tenant.as_str());

    Ok(Json(DomainStatusResponse {
        domain: tenant.to_string(),
        configured: config.is_some(),
        enabled: config.map(|c| c.enabled).unwrap_or(false),
        whitelisted: state.whitelist.is_allowed(tenant.as_str()),
        cache: state.cache.stats(tenant.as_str())?,
        rate_limit: state.limiter.stats(tenant.as_str())?,
    }))
}

/// GET /api/admin/cache/stats
pub async fn cache_stats(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        total_entries: state.cache.total_entry_count(),
        domains: state.cache.all_stats(),
    })
}

/// GET /api/admin/cache/stats/:domain
pub async fn domain_cache_stats(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<DomainCacheStatsResponse>, ApiError> {
    let tenant = domain_param(&domain)?;
    Ok(Json(DomainCacheStatsResponse {
        stats: state.cache.stats(tenant.as_str())?,
        keys: state.cache.list_keys(tenant.as_str())?,
    }))
}

/// POST /api/admin/cache/clear
pub async fn clear_cache(
    State(state): State<AppState>,
    Json(request): Json<ClearCacheRequest>,
) -> Result<Json<ClearCacheResponse>, ApiError> {
    let targets = match request.domain {
        Some(domain) => vec![domain_param(&domain)?.to_string()],
        None => state.cache.tenants(),
    };

    let mut cleared = 0;
    for domain in &targets {
        cleared += state.cache.clear_tenant(domain)?;
    }
    info!(event = "cache_cleared", domains = targets.len(), cleared = cleared, "Admin cache clear");

    Ok(Json(ClearCacheResponse {
        cleared,
        domains: targets,
    }))
}

/// GET /api/admin/whitelist
pub async fn whitelist(State(state): State<AppState>) -> Json<WhitelistResponse> {
    Json(WhitelistResponse {
        enabled: state.whitelist.is_enabled(),
        domains: state.whitelist.snapshot(),
    })
}

/// POST /api/admin/whitelist
pub async fn add_to_whitelist(
    State(state): State<AppState>,
    Json(request): Json<WhitelistRequest>,
) -> Result<Json<WhitelistChangeResponse>, ApiError> {
    let changed = state.whitelist.add(&request.domain)?;
    Ok(Json(WhitelistChangeResponse {
        domain: request.domain.trim().to_lowercase(),
        changed,
    }))
}

/// DELETE /api/admin/whitelist/:domain
pub async fn remove_from_whitelist(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Json<WhitelistChangeResponse> {
    let changed = state.whitelist.remove(&domain);
    Json(WhitelistChangeResponse {
        domain: domain.trim().to_lowercase(),
        changed,
    })
}

/// POST /api/admin/rate-limits/:domain/reset
pub async fn reset_rate_limits(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<RateLimitResetResponse>, ApiError> {
    let tenant = domain_param(&domain)?;
    state.limiter.reset_tenant(tenant.as_str())?;
    Ok(Json(RateLimitResetResponse {
        domain: tenant.to_string(),
        reset: true,
    }))
}

/// GET /api/admin/rate-limits/:domain
pub async fn rate_limit_stats(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<RateLimitStats>, ApiError> {
    let tenant = domain_param(&domain)?;
    Ok(Json(state.limiter.stats(tenant.as_str())?))
}

/// POST /api/admin/config/reload
///
/// Re-reads the configuration source and swaps in its tenants, whitelist
/// seed and per-tenant rate limits. Global limits and cache settings only
/// change on restart.
pub async fn reload_config(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let config = AppConfig::load(state.config_path.as_deref())
        .map_err(|e| GateError::Config(e.to_string()))?;

    let change = state
        .registry
        .replace_all(config.tenants.values().cloned(), config.default_tenant.clone());
    let whitelisted = state.whitelist.replace_all(
        state
            .registry
            .enabled_domains()
            .into_iter()
            .chain(config.security.additional_whitelist.iter().cloned()),
    );
    let tenants = state.registry.all();
    let rate_limit_overrides = state.limiter.sync_tenant_limits(tenants.iter().map(|c| c.as_ref()));
    metrics::counter!("admin.config_reloads").increment(1);

    info!(
        event = "configuration_reloaded",
        tenants = change.tenants,
        added = change.added.len(),
        removed = change.removed.len(),
        "Configuration reloaded"
    );

    Ok(Json(ReloadResponse {
        tenants: change.tenants,
        added_domains: change.added,
        removed_domains: change.removed,
        whitelisted,
        rate_limit_overrides,
        configuration_errors: state.registry.validate(),
    }))
}

/// POST /api/admin/config/validate
pub async fn validate_config(State(state): State<AppState>) -> Json<ValidationResponse> {
    let errors = state.registry.validate();
    Json(ValidationResponse {
        valid: errors.is_empty(),
        tenants: state.registry.len(),
        has_default: state.registry.default_config().is_some(),
        errors,
    })
}
