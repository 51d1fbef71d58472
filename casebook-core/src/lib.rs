//! Casebook Core - Entity Types
//!
//! Data structures, error taxonomy and configuration shared by every other
//! casebook crate. Behaviour here is limited to pure functions (parsing,
//! filtering, name reconciliation); all I/O lives in the storage and data
//! crates.

pub mod config;
pub mod entities;
pub mod enums;
pub mod error;
pub mod filter;
pub mod identity;
pub mod monitor;
pub mod names;
pub mod requests;

pub use config::{CacheConfig, CasebookConfig, MonitorConfig, RetryConfig, StoreConfig};
pub use entities::{Case, CasePage, CaseStats, CatalogEntry, Followup, PlazoSummary, Student};
pub use enums::{CaseStatus, ProcessStage, ProcessStageParseError, StageStatus};
pub use error::{
    CasebookError, CasebookResult, ConfigError, ErrorKind, StoreError, TransientError,
    ValidationError,
};
pub use filter::{FilterExpr, FilterOperator};
pub use identity::{new_record_id, CaseId, FollowupId, StudentId, TenantId, Timestamp};
pub use monitor::{Monitor, NoopMonitor};
pub use names::{canonical_name, NameRule, NameSource, StudentName, NAME_PRECEDENCE};
pub use requests::{CaseFilter, CasePatch, NewCase, NewFollowup, Page};
