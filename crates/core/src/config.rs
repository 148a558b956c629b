use crate::tenant::TenantConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Root application configuration. Loaded from an optional TOML file
/// layered under environment variables with the prefix `DOMAINGATE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    /// Tenant configurations keyed by domain.
    #[serde(default)]
    pub tenants: HashMap<String, TenantConfig>,
    /// Configuration served for well-formed domains with no entry of their own.
    #[serde(default)]
    pub default_tenant: Option<TenantConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

/// Sliding-window limits applied per tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_requests_per_hour")]
    pub requests_per_hour: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default = "default_whitelist_enabled")]
    pub whitelist_enabled: bool,
    /// Whitelisted in addition to every configured tenant domain.
    /// Entries may be exact names or `*.suffix` wildcards.
    #[serde(default)]
    pub additional_whitelist: Vec<String>,
    /// Paths served without tenant resolution.
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,
}

// Default functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    300
}
fn default_shutdown_timeout_secs() -> u64 {
    5
}
fn default_rate_limit_enabled() -> bool {
    true
}
fn default_burst_limit() -> u32 {
    10
}
fn default_requests_per_minute() -> u32 {
    60
}
fn default_requests_per_hour() -> u32 {
    1000
}
fn default_whitelist_enabled() -> bool {
    true
}
fn default_exempt_paths() -> Vec<String> {
    ["/health", "/ping", "/live", "/ready"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            burst_limit: default_burst_limit(),
            requests_per_minute: default_requests_per_minute(),
            requests_per_hour: default_requests_per_hour(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            whitelist_enabled: default_whitelist_enabled(),
            additional_whitelist: Vec::new(),
            exempt_paths: default_exempt_paths(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            security: SecurityConfig::default(),
            tenants: HashMap::new(),
            default_tenant: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional TOML file and environment variables.
    /// Environment variables win over the file.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        } else {
            builder = builder.add_source(config::File::with_name("domaingate").required(false));
        }

        let builder = builder.add_source(
            config::Environment::with_prefix("DOMAINGATE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("security.additional_whitelist")
                .with_list_parse_key("security.exempt_paths"),
        );

        let mut loaded: AppConfig = builder.build()?.try_deserialize()?;
        loaded.normalize();
        debug!(
            tenants = loaded.tenants.len(),
            has_default = loaded.default_tenant.is_some(),
            "Configuration parsed"
        );
        Ok(loaded)
    }

    /// Lower-case tenant keys and copy each key into its config's `domain`.
    pub fn normalize(&mut self) {
        self.tenants = std::mem::take(&mut self.tenants)
            .into_iter()
            .map(|(domain, mut tenant)| {
                let domain = domain.trim().to_lowercase();
                tenant.domain = domain.clone();
                (domain, tenant)
            })
            .collect();
        if let Some(default) = self.default_tenant.as_mut() {
            if default.domain.is_empty() {
                default.domain = "default".to_string();
            }
        }
    }
}
