use crate::tenant::RateWindowKind;
use thiserror::Error;

pub type GateResult<T> = Result<T, GateError>;

#[derive(Error, Debug)]
pub enum GateError {
    #[error("Invalid tenant: tenant id must not be empty")]
    InvalidTenant,

    #[error("No domain specified in query parameter, X-Domain header, or Host header")]
    NoTenantSpecified,

    #[error("Invalid domain format: {0}")]
    InvalidTenantFormat(String),

    #[error("Domain '{0}' not found and no default configuration available")]
    UnknownTenant(String),

    #[error("Domain '{0}' is not whitelisted")]
    NotWhitelisted(String),

    #[error(
        "{} rate limit exceeded for domain {tenant}: {observed} requests in the last {}s (limit {limit})",
        .window.label(),
        .window.horizon_secs()
    )]
    RateLimited {
        tenant: String,
        window: RateWindowKind,
        limit: u32,
        observed: u32,
    },

    #[error("Invalid cache TTL: {0}s (must be non-negative)")]
    InvalidTtl(i64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GateError {
    /// HTTP status the transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            GateError::NoTenantSpecified | GateError::InvalidTenantFormat(_) => 400,
            GateError::UnknownTenant(_) => 404,
            GateError::NotWhitelisted(_) | GateError::RateLimited { .. } => 403,
            GateError::InvalidTenant | GateError::InvalidTtl(_) => 400,
            GateError::Config(_)
            | GateError::Serialization(_)
            | GateError::Io(_)
            | GateError::Internal(_) => 500,
        }
    }

    /// The domain a resolution or admission failure refers to, if any.
    pub fn domain(&self) -> Option<&str> {
        match self {
            GateError::InvalidTenantFormat(d)
            | GateError::UnknownTenant(d)
            | GateError::NotWhitelisted(d) => Some(d),
            GateError::RateLimited { tenant, .. } => Some(tenant),
            _ => None,
        }
    }

    /// Stable machine-readable kind, used in error bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            GateError::InvalidTenant => "invalid_tenant",
            GateError::NoTenantSpecified => "no_tenant_specified",
            GateError::InvalidTenantFormat(_) => "invalid_tenant_format",
            GateError::UnknownTenant(_) => "unknown_tenant",
            GateError::NotWhitelisted(_) => "not_whitelisted",
            GateError::RateLimited { .. } => "rate_limited",
            GateError::InvalidTtl(_) => "invalid_ttl",
            GateError::Config(_) => "configuration_error",
            GateError::Serialization(_) => "serialization_error",
            GateError::Io(_) => "io_error",
            GateError::Internal(_) => "internal_error",
        }
    }
}
