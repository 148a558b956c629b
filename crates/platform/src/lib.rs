//! Admission policy shared by every request: the domain whitelist, the
//! per-tenant sliding-window rate limiter, and the tenant registry.

#![warn(clippy::unwrap_used)]

pub mod rate_limit;
pub mod registry;
pub mod whitelist;

pub use rate_limit::{RateDecision, RateLimitStats, RateLimiter};
pub use registry::{RegistryChange, TenantRegistry};
pub use whitelist::DomainWhitelist;
