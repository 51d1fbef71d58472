//! Casebook Data Layer
//!
//! Tenant-isolated operations over conduct cases and their follow-ups:
//!
//! - [`client`]: the query/mutation layer (`DataClient`)
//! - [`guard`]: suppression of records that cross tenant boundaries
//! - [`resolver`]: inference of a missing tenant from the parent case
//! - [`rows`]: lenient mapping between store rows and entities
//! - [`plazos`]: business-day deadlines of process stages
//! - [`monitor`]: tracing and webhook diagnostic sinks
//! - [`telemetry`]: tracing subscriber setup for binaries

pub mod client;
pub mod guard;
pub mod monitor;
pub mod plazos;
pub mod resolver;
pub mod rows;
pub mod search;
pub mod telemetry;

pub use client::{DashboardSnapshot, DataClient, INITIAL_FOLLOWUP_ACTION};
pub use guard::{TenantGuard, TenantOwned};
pub use monitor::{monitor_from_config, TracingMonitor, WebhookMonitor};
pub use plazos::{add_business_days, business_days_between, next_stage, summarize, summarize_many};
pub use resolver::{StoreTenantResolver, TenantResolver};
pub use search::sanitize_search;
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
