//! Casebook Test Utilities
//!
//! Shared test infrastructure for the casebook workspace:
//! - Proptest generators for identifiers, statuses and store rows
//! - A recording monitor for asserting on diagnostics
//! - Store fixtures and the stored procedures the data layer calls
//! - Assertions for casebook error variants

// Re-export the in-memory store from its source crate
pub use casebook_storage::{
    Fault, MemoryStore, StoreFailure, Tables, TransportError, TransportErrorKind,
};

// Re-export core types for convenience
pub use casebook_core::{
    CaseId, CaseStatus, CasebookError, CasebookResult, Monitor, ProcessStage, StageStatus,
    StoreError, TenantId, TransientError,
};

use serde_json::Value;
use std::sync::{Mutex, PoisonError};

// ============================================================================
// RECORDING MONITOR
// ============================================================================

/// Monitor that keeps every diagnostic it receives.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    records: Mutex<Vec<(String, Value)>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(context, payload)` pair, in order.
    pub fn records(&self) -> Vec<(String, Value)> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Payloads recorded under one context.
    pub fn payloads(&self, context: &str) -> Vec<Value> {
        self.records()
            .into_iter()
            .filter(|(c, _)| c == context)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn count(&self, context: &str) -> usize {
        self.payloads(context).len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Monitor for RecordingMonitor {
    fn notify(&self, context: &str, payload: Value) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((context.to_string(), payload));
    }
}

// ============================================================================
// STORED PROCEDURES
// ============================================================================

/// Register the procedures the data layer calls on a real store.
///
/// `start_case_followup(p_case_id)` moves the case to `en_seguimiento` and
/// fails with `P0002` when the case does not exist.
pub fn register_casebook_procedures(store: &MemoryStore) {
    store.register_rpc("start_case_followup", |tables: &mut Tables, params: &Value| {
        let case_id = params
            .get("p_case_id")
            .and_then(Value::as_str)
            .ok_or_else(|| StoreFailure::new("p_case_id is required").with_code("22004"))?;

        let case = tables
            .get_mut("cases")
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.get("id").and_then(Value::as_str) == Some(case_id))
            })
            .ok_or_else(|| {
                StoreFailure::new(format!("Caso {} no encontrado", case_id)).with_code("P0002")
            })?;

        if let Value::Object(fields) = case {
            fields.insert(
                "status".to_string(),
                Value::String(CaseStatus::InFollowUp.as_db_str().to_string()),
            );
        }
        Ok(Value::Bool(true))
    });
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for casebook identifiers and rows.

    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use serde_json::json;

    /// Generate a short tenant identifier.
    pub fn arb_tenant_id() -> impl Strategy<Value = TenantId> {
        "t[a-z0-9]{1,6}".prop_map(TenantId::from)
    }

    /// Generate a case identifier.
    pub fn arb_case_id() -> impl Strategy<Value = CaseId> {
        "c[a-z0-9]{1,8}".prop_map(CaseId::from)
    }

    /// Generate an identifier that is empty or whitespace only.
    pub fn arb_blank_id() -> impl Strategy<Value = String> {
        "[ \t]{0,4}"
    }

    pub fn arb_case_status() -> impl Strategy<Value = CaseStatus> {
        prop_oneof![
            Just(CaseStatus::Reported),
            Just(CaseStatus::InFollowUp),
            Just(CaseStatus::Closed),
        ]
    }

    pub fn arb_process_stage() -> impl Strategy<Value = ProcessStage> {
        proptest::sample::select(ProcessStage::ALL.to_vec())
    }

    pub fn arb_stage_status() -> impl Strategy<Value = StageStatus> {
        prop_oneof![
            Just(StageStatus::Pendiente),
            Just(StageStatus::EnCurso),
            Just(StageStatus::Completada),
            Just(StageStatus::Vencida),
        ]
    }

    /// Generate a date in 2024.
    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (1u32..=366).prop_filter_map("valid ordinal", |day| NaiveDate::from_yo_opt(2024, day))
    }

    /// Generate free search text, including pattern characters.
    pub fn arb_search_text() -> impl Strategy<Value = String> {
        r#"[a-zA-Z %_,()*\\'":.]{0,24}"#
    }

    /// Generate a case row owned by `tenant` with a student owned by
    /// `student_tenant`.
    pub fn arb_case_row_pair() -> impl Strategy<Value = (Value, TenantId, TenantId)> {
        (arb_case_id(), arb_tenant_id(), arb_tenant_id(), arb_case_status()).prop_map(
            |(id, tenant, student_tenant, status)| {
                let row = json!({
                    "id": id.as_str(),
                    "tenant_id": tenant.as_str(),
                    "status": status.as_db_str(),
                    "student_id": "s1",
                    "students": [{
                        "id": "s1",
                        "tenant_id": student_tenant.as_str(),
                        "full_name": "Ana Pérez",
                    }],
                });
                (row, tenant, student_tenant)
            },
        )
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows and stores for common scenarios.

    use super::*;
    use serde_json::json;

    pub fn case_row(id: &str, tenant: Option<&str>, status: CaseStatus) -> Value {
        json!({
            "id": id,
            "tenant_id": tenant,
            "status": status.as_db_str(),
            "incident_date": "2024-03-04",
            "conduct_type": "agresion",
            "description": format!("Caso {}", id),
            "course": "1A",
            "student_id": null,
            "created_at": "2024-03-04T10:00:00Z",
        })
    }

    pub fn case_row_with_student(id: &str, tenant: &str, student_id: &str) -> Value {
        let mut row = case_row(id, Some(tenant), CaseStatus::Reported);
        row["student_id"] = json!(student_id);
        row
    }

    pub fn student_row(id: &str, tenant: Option<&str>, full_name: &str) -> Value {
        json!({ "id": id, "tenant_id": tenant, "full_name": full_name })
    }

    pub fn followup_row(id: &str, case_id: &str, stage: ProcessStage, date: &str) -> Value {
        json!({
            "id": id,
            "case_id": case_id,
            "process_stage": stage.as_db_str(),
            "stage_status": StageStatus::EnCurso.as_db_str(),
            "action_date": date,
            "action_type": "Entrevista",
        })
    }

    /// Two schools: `t1` owns `c1` (with student `s1`) and `c2`; `t2` owns
    /// `c3`. Case `c4` in `t1` points at `s2`, a student of `t2`.
    pub fn two_tenant_store() -> MemoryStore {
        let store = MemoryStore::new()
            .with_table(
                "cases",
                vec![
                    case_row_with_student("c1", "t1", "s1"),
                    case_row("c2", Some("t1"), CaseStatus::Closed),
                    case_row("c3", Some("t2"), CaseStatus::Reported),
                    case_row_with_student("c4", "t1", "s2"),
                ],
            )
            .with_table(
                "students",
                vec![
                    student_row("s1", Some("t1"), "Ana Pérez"),
                    student_row("s2", Some("t2"), "Luis Soto"),
                ],
            )
            .with_table("case_followups", Vec::new());
        register_casebook_procedures(&store);
        store
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on casebook error variants.

    use super::*;

    /// Assert a validation error with exactly this message.
    pub fn assert_validation_message<T: std::fmt::Debug>(
        result: &CasebookResult<T>,
        message: &str,
    ) {
        match result {
            Err(CasebookError::Validation(err)) => assert_eq!(err.to_string(), message),
            other => panic!("Expected validation error {:?}, got {:?}", message, other),
        }
    }

    pub fn assert_transient<T: std::fmt::Debug>(result: &CasebookResult<T>) {
        assert!(
            matches!(result, Err(CasebookError::Transient(_))),
            "Expected transient error, got {:?}",
            result
        );
    }

    pub fn assert_store_error<T: std::fmt::Debug>(result: &CasebookResult<T>) {
        assert!(
            matches!(result, Err(CasebookError::Store(_))),
            "Expected store error, got {:?}",
            result
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recording_monitor() {
        let monitor = RecordingMonitor::new();
        monitor.notify("tenant_mismatch", json!({ "record_id": "c1" }));
        monitor.notify("tenant_unresolved", json!({}));
        assert_eq!(monitor.count("tenant_mismatch"), 1);
        assert_eq!(monitor.payloads("tenant_mismatch")[0]["record_id"], "c1");
        monitor.clear();
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_fixture_store_has_both_tenants() {
        let store = fixtures::two_tenant_store();
        assert_eq!(store.rows("cases").len(), 4);
        assert_eq!(store.rows("students").len(), 2);
    }
}
