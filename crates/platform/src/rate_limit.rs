//! Per-tenant sliding-window rate limiter backed by DashMap.
//!
//! Each tenant keeps the timestamps of its admitted requests in three
//! windows (10 s burst, 60 s, 3600 s). A check prunes, counts, compares and
//! appends under one per-tenant mutex, so concurrent requests for the same
//! tenant can never jointly exceed a limit.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use domaingate_core::config::RateLimitConfig;
use domaingate_core::{
    Clock, GateError, GateResult, RateWindowKind, SystemClock, TenantConfig, TenantId,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{info, warn};

/// Timestamps of admitted requests inside one trailing window.
#[derive(Debug, Default)]
struct SlidingWindow {
    hits: VecDeque<DateTime<Utc>>,
}

impl SlidingWindow {
    /// Drop timestamps at or before `now - horizon`. Timestamps are appended
    /// in clock order, so the oldest sit at the front.
    fn prune(&mut self, now: DateTime<Utc>, horizon: Duration) {
        let cutoff = now - horizon;
        while self.hits.front().is_some_and(|ts| *ts <= cutoff) {
            self.hits.pop_front();
        }
    }

    fn len(&self) -> u32 {
        u32::try_from(self.hits.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Default)]
struct TenantWindows {
    burst: SlidingWindow,
    minute: SlidingWindow,
    hour: SlidingWindow,
}

impl TenantWindows {
    fn window_mut(&mut self, kind: RateWindowKind) -> &mut SlidingWindow {
        match kind {
            RateWindowKind::Burst => &mut self.burst,
            RateWindowKind::Minute => &mut self.minute,
            RateWindowKind::Hour => &mut self.hour,
        }
    }

    fn prune_all(&mut self, now: DateTime<Utc>) {
        for kind in RateWindowKind::ORDERED {
            self.window_mut(kind)
                .prune(now, Duration::seconds(kind.horizon_secs()));
        }
    }

    fn record(&mut self, now: DateTime<Utc>) {
        self.burst.hits.push_back(now);
        self.minute.hits.push_back(now);
        self.hour.hits.push_back(now);
    }

    fn clear(&mut self) {
        self.burst.hits.clear();
        self.minute.hits.clear();
        self.hour.hits.clear();
    }
}

/// Result of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    Denied {
        window: RateWindowKind,
        limit: u32,
        observed: u32,
    },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Current usage for one tenant, after pruning.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub domain: String,
    pub enabled: bool,
    pub burst_requests: u32,
    pub minute_requests: u32,
    pub hourly_requests: u32,
    pub burst_limit: u32,
    pub minute_limit: u32,
    pub hour_limit: u32,
}

/// In-memory rate limiter with per-tenant overrides.
pub struct RateLimiter {
    windows: DashMap<TenantId, Arc<Mutex<TenantWindows>>>,
    default_config: RateLimitConfig,
    tenant_configs: DashMap<TenantId, RateLimitConfig>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter with the given default config.
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self::with_clock(default_config, Arc::new(SystemClock))
    }

    /// Create a rate limiter reading time from `clock`.
    pub fn with_clock(default_config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        info!(
            enabled = default_config.enabled,
            burst_limit = default_config.burst_limit,
            requests_per_minute = default_config.requests_per_minute,
            requests_per_hour = default_config.requests_per_hour,
            "RateLimiter initialized"
        );
        Self {
            windows: DashMap::new(),
            default_config,
            tenant_configs: DashMap::new(),
            clock,
        }
    }

    /// Override the limits for a specific tenant.
    pub fn set_tenant_limits(&self, tenant: &str, config: RateLimitConfig) -> GateResult<()> {
        let tenant = TenantId::new(tenant)?;
        info!(
            domain = %tenant,
            burst_limit = config.burst_limit,
            requests_per_minute = config.requests_per_minute,
            requests_per_hour = config.requests_per_hour,
            "Tenant rate limits overridden"
        );
        self.tenant_configs.insert(tenant, config);
        Ok(())
    }

    /// Drop a tenant's override so the default limits apply again.
    pub fn clear_tenant_limits(&self, tenant: &str) -> GateResult<bool> {
        let tenant = TenantId::new(tenant)?;
        Ok(self.tenant_configs.remove(&tenant).is_some())
    }

    /// Replace every override with those carried by `tenants`. Tenants
    /// without a `rate_limit` section fall back to the defaults. Returns the
    /// number of overrides now in force.
    pub fn sync_tenant_limits<'a, I>(&self, tenants: I) -> usize
    where
        I: IntoIterator<Item = &'a TenantConfig>,
    {
        self.tenant_configs.clear();
        for tenant in tenants {
            if let Some(limits) = &tenant.rate_limit {
                if let Err(e) = self.set_tenant_limits(&tenant.domain, limits.clone()) {
                    warn!(domain = %tenant.domain, error = %e, "Skipping rate limit override");
                }
            }
        }
        self.tenant_configs.len()
    }

    fn config_for(&self, tenant: &TenantId) -> RateLimitConfig {
        self.tenant_configs
            .get(tenant)
            .map(|c| c.value().clone())
            .unwrap_or_else(|| self.default_config.clone())
    }

    fn tenant_windows(&self, tenant: &TenantId) -> Arc<Mutex<TenantWindows>> {
        if let Some(existing) = self.windows.get(tenant) {
            return existing.value().clone();
        }
        self.windows
            .entry(tenant.clone())
            .or_default()
            .value()
            .clone()
    }

    /// Check (and on success consume) one request for `tenant`. Windows are
    /// checked burst, then minute, then hour; the first exceeded one is
    /// reported.
    pub fn check(&self, tenant: &str, client_ip: Option<&str>) -> GateResult<RateDecision> {
        let tenant = TenantId::new(tenant)?;
        let config = self.config_for(&tenant);
        if !config.enabled {
            return Ok(RateDecision::Allowed);
        }

        let now = self.clock.now();
        let state = self.tenant_windows(&tenant);
        let mut windows = state.lock();
        windows.prune_all(now);

        for kind in RateWindowKind::ORDERED {
            let limit = limit_for(&config, kind);
            let observed = windows.window_mut(kind).len();
            if observed >= limit {
                drop(windows);
                metrics::counter!("rate_limit.denied", "window" => window_tag(kind)).increment(1);
                warn!(
                    event = denial_event(kind),
                    domain = %tenant,
                    client_ip = client_ip.unwrap_or("unknown"),
                    observed = observed,
                    limit = limit,
                    "Rate limit exceeded"
                );
                return Ok(RateDecision::Denied {
                    window: kind,
                    limit,
                    observed,
                });
            }
        }

        windows.record(now);
        metrics::counter!("rate_limit.allowed").increment(1);
        Ok(RateDecision::Allowed)
    }

    /// Like [`check`](Self::check), but a denial becomes
    /// [`GateError::RateLimited`].
    pub fn admit(&self, tenant: &str, client_ip: Option<&str>) -> GateResult<()> {
        match self.check(tenant, client_ip)? {
            RateDecision::Allowed => Ok(()),
            RateDecision::Denied {
                window,
                limit,
                observed,
            } => Err(GateError::RateLimited {
                tenant: tenant.trim().to_lowercase(),
                window,
                limit,
                observed,
            }),
        }
    }

    /// `(allowed, reason)`; the reason names the exceeded window, the limit
    /// and the observed count.
    pub fn is_allowed(&self, tenant: &str, client_ip: Option<&str>) -> (bool, Option<String>) {
        match self.admit(tenant, client_ip) {
            Ok(()) => (true, None),
            Err(e) => (false, Some(e.to_string())),
        }
    }

    /// Current window counts and effective limits for a tenant.
    pub fn stats(&self, tenant: &str) -> GateResult<RateLimitStats> {
        let tenant = TenantId::new(tenant)?;
        let config = self.config_for(&tenant);
        let (burst, minute, hour) = match self.windows.get(&tenant).map(|e| e.value().clone()) {
            Some(state) => {
                let mut windows = state.lock();
                windows.prune_all(self.clock.now());
                (windows.burst.len(), windows.minute.len(), windows.hour.len())
            }
            None => (0, 0, 0),
        };

        Ok(RateLimitStats {
            domain: tenant.to_string(),
            enabled: config.enabled,
            burst_requests: burst,
            minute_requests: minute,
            hourly_requests: hour,
            burst_limit: config.burst_limit,
            minute_limit: config.requests_per_minute,
            hour_limit: config.requests_per_hour,
        })
    }

    /// Clear all three windows for a tenant. Unknown tenants are a no-op.
    pub fn reset_tenant(&self, tenant: &str) -> GateResult<()> {
        let tenant = TenantId::new(tenant)?;
        if let Some(state) = self.windows.get(&tenant).map(|e| e.value().clone()) {
            state.lock().clear();
        }
        info!(event = "rate_limit_reset", domain = %tenant, "Rate limits reset");
        Ok(())
    }

    /// Tenants that currently hold window state.
    pub fn tracked_tenants(&self) -> usize {
        self.windows.len()
    }
}

fn limit_for(config: &RateLimitConfig, kind: RateWindowKind) -> u32 {
    match kind {
        RateWindowKind::Burst => config.burst_limit,
        RateWindowKind::Minute => config.requests_per_minute,
        RateWindowKind::Hour => config.requests_per_hour,
    }
}

fn denial_event(kind: RateWindowKind) -> &'static str {
    match kind {
        RateWindowKind::Burst => "rate_limit_burst_exceeded",
        RateWindowKind::Minute => "rate_limit_minute_exceeded",
        RateWindowKind::Hour => "rate_limit_hour_exceeded",
    }
}

fn window_tag(kind: RateWindowKind) -> &'static str {
    match kind {
        RateWindowKind::Burst => "burst",
        RateWindowKind::Minute => "minute",
        RateWindowKind::Hour => "hour",
    }
}
