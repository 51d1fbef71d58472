//! Diagnostic channel
//!
//! Data-integrity signals (tenant mismatches, orphaned writes) are reported
//! through an injected [`Monitor`] rather than a global, so tests can
//! substitute a recorder. Notification is fire-and-forget: implementations
//! must never panic or block the caller.

use serde_json::Value;

/// A nested relation belonged to a different tenant and was suppressed.
pub const TENANT_MISMATCH: &str = "tenant_mismatch";

/// No tenant could be determined for a record being written.
pub const TENANT_UNRESOLVED: &str = "tenant_unresolved";

/// A case was created without a tenant.
pub const CASE_WITHOUT_TENANT: &str = "case_without_tenant";

/// Fire-and-forget diagnostic sink.
pub trait Monitor: Send + Sync {
    /// Report a diagnostic. `context` names the condition, `payload` carries
    /// the identifiers needed to investigate it.
    fn notify(&self, context: &str, payload: Value);
}

/// Monitor that discards every diagnostic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn notify(&self, _context: &str, _payload: Value) {}
}
