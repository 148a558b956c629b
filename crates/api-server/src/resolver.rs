//! Tenant resolution from an inbound request.

use axum::extract::ConnectInfo;
use axum::http::{header, Request};
use domaingate_core::{GateError, GateResult, TenantConfig, TenantConfigProvider, TenantId};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::debug;

/// Query parameter that names the tenant explicitly.
pub const DOMAIN_QUERY_PARAM: &str = "domain";

/// Override header that names the tenant.
pub const DOMAIN_HEADER: &str = "x-domain";

/// The parts of a request tenant resolution reads.
///
/// A header that is present but not visible ASCII is an error, not an
/// absence, so resolution never skips past it.
pub trait RequestAddressing {
    fn query_param(&self, name: &str) -> Option<String>;
    fn header_value(&self, name: &str) -> GateResult<Option<String>>;
    /// `Host` header (or URI authority), possibly with a port.
    fn host(&self) -> GateResult<Option<String>>;
    fn client_addr(&self) -> Option<IpAddr>;
}

impl<B> RequestAddressing for Request<B> {
    fn query_param(&self, name: &str) -> Option<String> {
        let query = self.uri().query()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    fn header_value(&self, name: &str) -> GateResult<Option<String>> {
        let Some(value) = self.headers().get(name) else {
            return Ok(None);
        };
        value.to_str().map(|v| Some(v.to_string())).map_err(|_| {
            GateError::InvalidTenantFormat(String::from_utf8_lossy(value.as_bytes()).into_owned())
        })
    }

    fn host(&self) -> GateResult<Option<String>> {
        match self.header_value(header::HOST.as_str())? {
            Some(host) => Ok(Some(host)),
            None => Ok(self.uri().authority().map(|a| a.as_str().to_string())),
        }
    }

    fn client_addr(&self) -> Option<IpAddr> {
        self.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip())
    }
}

/// Where the tenant name was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainSource {
    QueryParam,
    Header,
    Host,
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    /// The domain that was asked for, even when the default config serves it.
    pub tenant: TenantId,
    pub config: Arc<TenantConfig>,
    pub source: DomainSource,
    pub uses_default: bool,
}

pub struct DomainResolver {
    provider: Arc<dyn TenantConfigProvider>,
}

impl DomainResolver {
    pub fn new(provider: Arc<dyn TenantConfigProvider>) -> Self {
        Self { provider }
    }

    /// First non-empty of query param, `X-Domain`, `Host` (port stripped).
    /// No fallthrough once one is found.
    pub fn extract(&self, request: &impl RequestAddressing) -> GateResult<(TenantId, DomainSource)> {
        let (raw, source) = if let Some(v) = non_empty(request.query_param(DOMAIN_QUERY_PARAM)) {
            (v, DomainSource::QueryParam)
        } else if let Some(v) = non_empty(request.header_value(DOMAIN_HEADER)?) {
            (v, DomainSource::Header)
        } else if let Some(v) = non_empty(request.host()?) {
            let host = v.split(':').next().unwrap_or_default().to_string();
            (host, DomainSource::Host)
        } else {
            return Err(GateError::NoTenantSpecified);
        };

        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(GateError::InvalidTenantFormat(normalized));
        }
        let tenant = TenantId::parse_domain(&normalized)?;
        Ok((tenant, source))
    }

    pub fn resolve(&self, request: &impl RequestAddressing) -> GateResult<ResolvedTenant> {
        let (tenant, source) = self.extract(request)?;
        self.resolve_tenant(tenant, source)
    }

    /// Attach configuration to an already extracted tenant, falling back to
    /// the default configuration.
    pub fn resolve_tenant(&self, tenant: TenantId, source: DomainSource) -> GateResult<ResolvedTenant> {
        if let Some(config) = self.provider.lookup(&tenant) {
            debug!(domain = %tenant, client = %config.client_name, source = ?source, "Resolved domain");
            return Ok(ResolvedTenant {
                tenant,
                config,
                source,
                uses_default: false,
            });
        }

        match self.provider.default_config() {
            Some(config) => {
                debug!(domain = %tenant, source = ?source, "Resolved domain to default configuration");
                Ok(ResolvedTenant {
                    tenant,
                    config,
                    source,
                    uses_default: true,
                })
            }
            None => Err(GateError::UnknownTenant(tenant.to_string())),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
