//! Request payloads accepted by the query/mutation layer

use crate::{CaseId, CaseStatus, ProcessStage, StageStatus, StudentId, TenantId};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Payload for creating a case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCase {
    pub tenant_id: Option<TenantId>,
    /// Defaults to `Reported` when omitted
    pub status: Option<CaseStatus>,
    pub incident_date: Option<NaiveDate>,
    pub incident_time: Option<String>,
    pub course: Option<String>,
    pub conduct_type: Option<String>,
    pub conduct_category: Option<String>,
    pub description: Option<String>,
    pub student_id: Option<StudentId>,
}

/// Partial update of a case. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CasePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CaseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conduct_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conduct_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<StudentId>,
}

impl CasePatch {
    /// True when the patch would not change anything.
    pub fn is_empty(&self) -> bool {
        self == &CasePatch::default()
    }
}

/// Payload for creating a follow-up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFollowup {
    pub case_id: Option<CaseId>,
    /// Inferred from the parent case when omitted
    pub tenant_id: Option<TenantId>,
    pub process_stage: Option<ProcessStage>,
    /// Defaults to today
    pub action_date: Option<NaiveDate>,
    pub action_type: Option<String>,
    pub stage_status: Option<StageStatus>,
    pub detail: Option<String>,
    pub observations: Option<String>,
    pub responsible: Option<String>,
}

impl NewFollowup {
    /// Start a payload for the given case and stage.
    pub fn for_case(case_id: CaseId, process_stage: ProcessStage) -> Self {
        Self {
            case_id: Some(case_id),
            process_stage: Some(process_stage),
            ..Self::default()
        }
    }
}

/// Filters for listing cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFilter {
    /// Tenant to scope the listing to
    pub tenant_id: Option<TenantId>,
    /// `None` means any status; `Some(vec![])` matches nothing
    pub status: Option<Vec<CaseStatus>>,
    /// Free text matched against description, course and conduct type
    pub search: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl CaseFilter {
    /// Filter scoped to one tenant.
    pub fn for_tenant(tenant_id: TenantId) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }

    /// Restrict to the given statuses.
    pub fn with_status(mut self, status: Vec<CaseStatus>) -> Self {
        self.status = Some(status);
        self
    }

    /// Restrict to cases matching the search text.
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub index: u32,
    pub size: u32,
}

impl Page {
    /// Largest page size the layer will request from the store.
    pub const MAX_SIZE: u32 = 200;

    /// Create a page request; size is clamped to `1..=MAX_SIZE`.
    pub fn new(index: u32, size: u32) -> Self {
        Self {
            index,
            size: size.clamp(1, Self::MAX_SIZE),
        }
    }

    /// Offset of the first row.
    pub fn offset(&self) -> u64 {
        u64::from(self.index) * u64::from(self.size)
    }

    /// Inclusive row range `(from, to)` as used by range-based stores.
    pub fn range(&self) -> (u64, u64) {
        let from = self.offset();
        (from, from + u64::from(self.size) - 1)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 25)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_range_is_inclusive() {
        let page = Page::new(2, 10);
        assert_eq!(page.offset(), 20);
        assert_eq!(page.range(), (20, 29));
    }

    #[test]
    fn test_page_size_is_clamped() {
        assert_eq!(Page::new(0, 0).size, 1);
        assert_eq!(Page::new(0, 10_000).size, Page::MAX_SIZE);
    }

    #[test]
    fn test_patch_serialises_only_set_fields() {
        let patch = CasePatch {
            description: Some("updated".to_string()),
            ..CasePatch::default()
        };
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, serde_json::json!({ "description": "updated" }));
        assert!(!patch.is_empty());
        assert!(CasePatch::default().is_empty());
    }
}
