#![warn(clippy::unwrap_used)]

pub mod admin_rest;
pub mod error;
pub mod gate;
pub mod middleware;
pub mod resolver;
pub mod rest;
pub mod server;

pub use error::{ApiError, ErrorResponse};
pub use gate::{RequestContext, RequestGate, TenantCacheHandle};
pub use middleware::{GateState, Tenant};
pub use resolver::{DomainResolver, DomainSource, RequestAddressing, ResolvedTenant};
pub use server::{build_router, ApiServer};
