//! Entity types returned by the data layer

use crate::{
    CaseId, CaseStatus, FollowupId, ProcessStage, StageStatus, StudentId, TenantId, Timestamp,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// CASE
// ============================================================================

/// A conduct case, the central entity of the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    /// Owning tenant; rows written before tenancy was enforced may lack it
    pub tenant_id: Option<TenantId>,
    pub status: CaseStatus,
    pub incident_date: Option<NaiveDate>,
    /// Free-form time of day as captured by the reporting form
    pub incident_time: Option<String>,
    pub course: Option<String>,
    pub conduct_type: Option<String>,
    pub conduct_category: Option<String>,
    pub description: Option<String>,
    pub student_id: Option<StudentId>,
    /// Nested student relation. `None` both when absent and when it was
    /// suppressed for belonging to another tenant; serialises as `null`.
    #[serde(rename = "students")]
    pub student: Option<Student>,
    pub created_at: Option<Timestamp>,
    pub closed_at: Option<Timestamp>,
    pub closed_by: Option<String>,
}

impl Case {
    /// Create a bare case with only identity fields populated.
    pub fn new(id: CaseId, tenant_id: Option<TenantId>) -> Self {
        Self {
            id,
            tenant_id,
            status: CaseStatus::Reported,
            incident_date: None,
            incident_time: None,
            course: None,
            conduct_type: None,
            conduct_category: None,
            description: None,
            student_id: None,
            student: None,
            created_at: None,
            closed_at: None,
            closed_by: None,
        }
    }
}

/// A student referenced by a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub tenant_id: Option<TenantId>,
    /// Canonical display name reconciled from the legacy name columns
    pub full_name: Option<String>,
    pub given_names: Option<String>,
    pub surnames: Option<String>,
    pub course: Option<String>,
}

// ============================================================================
// FOLLOW-UP
// ============================================================================

/// A step of the due-process follow-up attached to a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Followup {
    pub id: FollowupId,
    pub case_id: CaseId,
    pub tenant_id: Option<TenantId>,
    pub action_date: NaiveDate,
    pub action_type: String,
    pub process_stage: ProcessStage,
    pub stage_status: StageStatus,
    pub detail: Option<String>,
    pub observations: Option<String>,
    pub responsible: Option<String>,
    pub created_at: Option<Timestamp>,
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// One page of cases plus the unpaginated total.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CasePage {
    pub rows: Vec<Case>,
    pub total: u64,
}

impl CasePage {
    /// The empty page returned by short-circuited queries.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Case counts for one tenant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaseStats {
    pub tenant_id: Option<TenantId>,
    pub total: u64,
    /// Count per database status string
    pub by_status: BTreeMap<String, u64>,
}

impl CaseStats {
    /// Count for one status, zero when absent.
    pub fn count(&self, status: &CaseStatus) -> u64 {
        self.by_status
            .get(status.as_db_str())
            .copied()
            .unwrap_or(0)
    }
}

/// Deadline summary of the current process stage of a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlazoSummary {
    pub case_id: CaseId,
    /// Latest stage reached; `None` when the case has no follow-ups yet
    pub current_stage: Option<ProcessStage>,
    pub stage_status: Option<StageStatus>,
    pub stage_started: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    /// Business days until `due_date`; negative once overdue
    pub business_days_remaining: Option<i64>,
    pub overdue: bool,
    pub followup_count: usize,
}

impl PlazoSummary {
    /// Summary for a case without any follow-up record.
    pub fn without_followups(case_id: CaseId) -> Self {
        Self {
            case_id,
            current_stage: None,
            stage_status: None,
            stage_started: None,
            due_date: None,
            business_days_remaining: None,
            overdue: false,
            followup_count: 0,
        }
    }
}

/// An entry of a shared lookup catalog (conduct types, courses, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub code: String,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
