//! Tenant guard
//!
//! Rows coming back from the store are not trusted to respect tenant
//! boundaries. The guard compares each record's owning tenant with the
//! tenants of its nested relations, strips any relation owned by someone
//! else and reports it through the [`Monitor`]. It never fails a read.

use crate::resolver::TenantResolver;
use casebook_core::monitor::{TENANT_MISMATCH, TENANT_UNRESOLVED};
use casebook_core::{
    Case, CaseId, CasebookError, CasebookResult, Followup, Monitor, StoreError, TenantId,
};
use serde_json::json;
use std::sync::Arc;

/// A record with an owning tenant and possibly tenant-bearing relations.
pub trait TenantOwned {
    /// Entity name used in diagnostics.
    const ENTITY: &'static str;

    fn record_id(&self) -> String;

    fn owner_tenant(&self) -> Option<&TenantId>;

    /// Present relations with the tenant each one claims.
    fn relation_tenants(&self) -> Vec<(&'static str, Option<TenantId>)> {
        Vec::new()
    }

    /// Replace a relation with absent.
    fn clear_relation(&mut self, _relation: &str) {}
}

impl TenantOwned for Case {
    const ENTITY: &'static str = "case";

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn owner_tenant(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }

    fn relation_tenants(&self) -> Vec<(&'static str, Option<TenantId>)> {
        self.student
            .as_ref()
            .map(|student| vec![("students", student.tenant_id.clone())])
            .unwrap_or_default()
    }

    fn clear_relation(&mut self, relation: &str) {
        if relation == "students" {
            self.student = None;
        }
    }
}

impl TenantOwned for Followup {
    const ENTITY: &'static str = "followup";

    fn record_id(&self) -> String {
        self.id.to_string()
    }

    fn owner_tenant(&self) -> Option<&TenantId> {
        self.tenant_id.as_ref()
    }
}

/// Present, non-blank tenant.
fn present(tenant: Option<&TenantId>) -> Option<&TenantId> {
    tenant.filter(|t| !t.is_blank())
}

#[derive(Clone)]
pub struct TenantGuard {
    monitor: Arc<dyn Monitor>,
}

impl std::fmt::Debug for TenantGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantGuard").finish_non_exhaustive()
    }
}

impl TenantGuard {
    pub fn new(monitor: Arc<dyn Monitor>) -> Self {
        Self { monitor }
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }

    /// Strip every nested relation whose tenant differs from the record's.
    ///
    /// The record's own tenant wins over `context`. A relation is only
    /// stripped when both tenants are known and differ.
    pub fn sanitize<T: TenantOwned>(&self, mut record: T, context: Option<&TenantId>) -> T {
        let parent = present(record.owner_tenant())
            .or_else(|| present(context))
            .cloned();
        let Some(parent) = parent else {
            return record;
        };

        for (relation, tenant) in record.relation_tenants() {
            let Some(tenant) = present(tenant.as_ref()).cloned() else {
                continue;
            };
            if tenant == parent {
                continue;
            }

            self.monitor.notify(
                TENANT_MISMATCH,
                json!({
                    "entity": T::ENTITY,
                    "record_id": record.record_id(),
                    "relation": relation,
                    "parent_tenant": parent.as_str(),
                    "relation_tenant": tenant.as_str(),
                }),
            );
            tracing::warn!(
                entity = T::ENTITY,
                record_id = %record.record_id(),
                relation,
                "Suppressed relation from another tenant"
            );
            record.clear_relation(relation);
        }

        record
    }

    pub fn sanitize_all<T: TenantOwned>(
        &self,
        records: Vec<T>,
        context: Option<&TenantId>,
    ) -> Vec<T> {
        records
            .into_iter()
            .map(|record| self.sanitize(record, context))
            .collect()
    }

    /// Whether a top-level record may be returned under `scope`.
    ///
    /// Records owned by another tenant are refused with a diagnostic; records
    /// without a tenant, or reads without a scope, are admitted.
    pub fn admits<T: TenantOwned>(&self, record: &T, scope: Option<&TenantId>) -> bool {
        match (present(record.owner_tenant()), present(scope)) {
            (Some(owner), Some(scope)) if owner != scope => {
                self.monitor.notify(
                    TENANT_MISMATCH,
                    json!({
                        "entity": T::ENTITY,
                        "record_id": record.record_id(),
                        "relation": null,
                        "parent_tenant": scope.as_str(),
                        "relation_tenant": owner.as_str(),
                    }),
                );
                false
            }
            _ => true,
        }
    }

    /// Tenant for a write under the parent case `case_id`.
    ///
    /// `claimed` is the tenant the caller acts for (explicit, else session).
    /// The parent case's owner is always looked up: when it is known and
    /// differs from `claimed`, a `tenant_mismatch` is reported and the case
    /// is refused as not found. A known owner is the result; otherwise the
    /// claimed tenant is. When neither exists, `tenant_unresolved` is
    /// reported and the write proceeds without a tenant.
    pub async fn resolve_tenant(
        &self,
        operation: &str,
        claimed: Option<&TenantId>,
        case_id: Option<&CaseId>,
        resolver: &dyn TenantResolver,
    ) -> CasebookResult<Option<TenantId>> {
        let claimed = present(claimed);
        let case_id = case_id.filter(|id| !id.is_blank());

        let reason = match case_id {
            None => "no case to infer from".to_string(),
            Some(case_id) => match resolver.tenant_of_case(case_id).await {
                Ok(Some(owner)) if !owner.is_blank() => {
                    return self.owned_by(operation, case_id, owner, claimed);
                }
                Ok(_) => "case has no tenant".to_string(),
                Err(CasebookError::Store(err @ StoreError::NotFound { .. })) => {
                    err.to_string()
                }
                Err(err) => return Err(err),
            },
        };

        if let Some(claimed) = claimed {
            return Ok(Some(claimed.clone()));
        }

        self.monitor.notify(
            TENANT_UNRESOLVED,
            json!({
                "operation": operation,
                "case_id": case_id.map(CaseId::as_str),
                "reason": reason,
            }),
        );
        Ok(None)
    }

    fn owned_by(
        &self,
        operation: &str,
        case_id: &CaseId,
        owner: TenantId,
        claimed: Option<&TenantId>,
    ) -> CasebookResult<Option<TenantId>> {
        match claimed {
            Some(claimed) if *claimed != owner => {
                self.monitor.notify(
                    TENANT_MISMATCH,
                    json!({
                        "entity": Case::ENTITY,
                        "record_id": case_id.as_str(),
                        "relation": null,
                        "parent_tenant": claimed.as_str(),
                        "relation_tenant": owner.as_str(),
                        "operation": operation,
                    }),
                );
                tracing::warn!(
                    operation,
                    case_id = %case_id,
                    tenant_id = %claimed,
                    "Refused write to another tenant's case"
                );
                Err(StoreError::NotFound {
                    entity: Case::ENTITY.to_string(),
                    id: case_id.to_string(),
                }
                .into())
            }
            _ => {
                tracing::debug!(
                    operation,
                    case_id = %case_id,
                    tenant_id = %owner,
                    "Tenant of parent case"
                );
                Ok(Some(owner))
            }
        }
    }
}
