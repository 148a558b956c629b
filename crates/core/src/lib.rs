pub mod clock;
pub mod config;
pub mod error;
pub mod tenant;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{GateError, GateResult};
pub use tenant::{RateWindowKind, TenantConfig, TenantConfigProvider, TenantId};
