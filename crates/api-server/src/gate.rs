//! Per-request admission: resolve, whitelist, rate limit, bind context.

use crate::resolver::{DomainResolver, DomainSource, RequestAddressing};
use domaingate_cache::{CacheManager, CacheStats, CacheValue};
use domaingate_core::{GateError, GateResult, TenantConfig, TenantConfigProvider, TenantId};
use domaingate_platform::{DomainWhitelist, RateLimiter};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Cache access bound to one tenant.
#[derive(Clone)]
pub struct TenantCacheHandle {
    tenant: TenantId,
    config: Arc<TenantConfig>,
    cache: Arc<CacheManager>,
}

impl TenantCacheHandle {
    pub fn get(&self, key: &str) -> GateResult<Option<CacheValue>> {
        self.cache.get(self.tenant.as_str(), key)
    }

    /// Store with an explicit TTL, or the manager's default when `None`.
    pub fn set(&self, key: &str, value: impl Into<CacheValue>, ttl: Option<Duration>) -> GateResult<()> {
        self.cache.set(self.tenant.as_str(), key, value, ttl)
    }

    /// Store using the tenant's configured cache timeout.
    pub fn set_with_tenant_config(&self, key: &str, value: impl Into<CacheValue>) -> GateResult<()> {
        self.cache
            .set_with_tenant_config(self.tenant.as_str(), key, value, &self.config)
    }

    pub fn delete(&self, key: &str) -> GateResult<bool> {
        self.cache.delete(self.tenant.as_str(), key)
    }

    pub fn stats(&self) -> GateResult<CacheStats> {
        self.cache.stats(self.tenant.as_str())
    }
}

/// Everything a handler knows about the tenant of the current request.
#[derive(Clone)]
pub struct RequestContext {
    pub tenant: TenantId,
    pub config: Arc<TenantConfig>,
    pub source: DomainSource,
    pub uses_default: bool,
    pub client_ip: Option<IpAddr>,
    pub cache: TenantCacheHandle,
}

pub struct RequestGate {
    resolver: DomainResolver,
    whitelist: Arc<DomainWhitelist>,
    limiter: Arc<RateLimiter>,
    cache: Arc<CacheManager>,
}

impl RequestGate {
    pub fn new(
        provider: Arc<dyn TenantConfigProvider>,
        whitelist: Arc<DomainWhitelist>,
        limiter: Arc<RateLimiter>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            resolver: DomainResolver::new(provider),
            whitelist,
            limiter,
            cache,
        }
    }

    pub fn resolver(&self) -> &DomainResolver {
        &self.resolver
    }

    /// Run the full admission sequence. Each failure is a distinct
    /// [`GateError`] variant.
    pub fn admit(&self, request: &impl RequestAddressing) -> GateResult<RequestContext> {
        let result = self.run(request);
        match &result {
            Ok(ctx) => {
                metrics::counter!("gate.admitted").increment(1);
                debug!(domain = %ctx.tenant, client = %ctx.config.client_name, "Request admitted");
            }
            Err(e) => {
                metrics::counter!("gate.rejected", "kind" => e.kind()).increment(1);
                if matches!(
                    e,
                    GateError::NoTenantSpecified
                        | GateError::InvalidTenantFormat(_)
                        | GateError::UnknownTenant(_)
                ) {
                    warn!(
                        event = "domain_resolution_failed",
                        domain = e.domain().unwrap_or("unknown"),
                        error = %e,
                        "Domain resolution failed"
                    );
                }
            }
        }
        result
    }

    fn run(&self, request: &impl RequestAddressing) -> GateResult<RequestContext> {
        let resolved = self.resolver.resolve(request)?;
        self.whitelist.validate(&resolved.tenant)?;

        let client_ip = request.client_addr();
        let ip = client_ip.map(|ip| ip.to_string());
        self.limiter.admit(resolved.tenant.as_str(), ip.as_deref())?;

        let cache = TenantCacheHandle {
            tenant: resolved.tenant.clone(),
            config: resolved.config.clone(),
            cache: self.cache.clone(),
        };
        Ok(RequestContext {
            tenant: resolved.tenant,
            config: resolved.config,
            source: resolved.source,
            uses_default: resolved.uses_default,
            client_ip,
            cache,
        })
    }
}
