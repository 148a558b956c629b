//! Tenant identity and per-tenant configuration shared by every crate.

use crate::config::RateLimitConfig;
use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Longest fully qualified domain name accepted as a tenant id.
pub const MAX_DOMAIN_LEN: usize = 253;

/// Longest single label between dots.
pub const MAX_LABEL_LEN: usize = 63;

/// Normalised (trimmed, lower-cased) tenant identifier.
///
/// Construction rejects empty input, so every value of this type names a
/// tenant. Use [`TenantId::parse_domain`] where the id must also look like a
/// domain name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(raw: &str) -> GateResult<Self> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(GateError::InvalidTenant);
        }
        Ok(Self(normalized))
    }

    /// Normalise and validate as a domain name.
    pub fn parse_domain(raw: &str) -> GateResult<Self> {
        let id = Self::new(raw)?;
        if !is_valid_domain_format(&id.0) {
            return Err(GateError::InvalidTenantFormat(id.0));
        }
        Ok(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TenantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for TenantId {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_domain(s)
    }
}

/// Domain-name shape check: `[A-Za-z0-9.-]`, at most 253 chars, no empty
/// labels, no label longer than 63 chars, no label starting or ending with
/// `-`, and no `..` or `--` anywhere.
pub fn is_valid_domain_format(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return false;
    }
    if !domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
    {
        return false;
    }
    if domain.starts_with(&['.', '-'][..]) || domain.ends_with(&['.', '-'][..]) {
        return false;
    }
    if domain.contains("..") || domain.contains("--") {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
    })
}

/// Which sliding window a rate-limit decision refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindowKind {
    Burst,
    Minute,
    Hour,
}

impl RateWindowKind {
    /// Checked in this order; the first exceeded window is reported.
    pub const ORDERED: [RateWindowKind; 3] = [Self::Burst, Self::Minute, Self::Hour];

    pub fn horizon_secs(&self) -> i64 {
        match self {
            Self::Burst => 10,
            Self::Minute => 60,
            Self::Hour => 3600,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Burst => "Burst",
            Self::Minute => "Per-minute",
            Self::Hour => "Per-hour",
        }
    }
}

/// Configuration for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Filled in from the map key when loaded from configuration.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub client_name: String,
    /// Identifier of the tenant's upstream spreadsheet.
    #[serde(default)]
    pub data_source_id: String,
    #[serde(default = "default_cache_timeout_secs")]
    pub cache_timeout_secs: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub custom_settings: HashMap<String, serde_json::Value>,
    /// Replaces the global rate limits for this tenant when set.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

fn default_cache_timeout_secs() -> u64 {
    300
}
fn default_enabled() -> bool {
    true
}

impl TenantConfig {
    pub fn new(domain: &str, client_name: &str, cache_timeout_secs: u64) -> Self {
        Self {
            domain: domain.to_string(),
            client_name: client_name.to_string(),
            data_source_id: String::new(),
            cache_timeout_secs,
            enabled: true,
            custom_settings: HashMap::new(),
            rate_limit: None,
        }
    }

    /// Returns every problem found; empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.domain.is_empty() {
            errors.push("Domain name is required".to_string());
        } else if self.domain != "default" && !is_valid_domain_format(&self.domain) {
            errors.push(format!("Invalid domain format: {}", self.domain));
        }
        if self.data_source_id.is_empty() {
            errors.push("Data source id is required".to_string());
        }
        if self.client_name.is_empty() {
            errors.push("Client name is required".to_string());
        }
        errors
    }
}

/// Source of tenant configuration consumed by resolution and caching.
pub trait TenantConfigProvider: Send + Sync {
    /// Configuration for an enabled tenant, if one exists.
    fn lookup(&self, tenant: &TenantId) -> Option<Arc<TenantConfig>>;

    /// Fallback used when a well-formed domain has no configuration.
    fn default_config(&self) -> Option<Arc<TenantConfig>>;
}
