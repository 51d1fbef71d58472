//! Tenant inference
//!
//! Writes under a parent case look up the case's tenant through a
//! [`TenantResolver`], to fill in a missing tenant and to refuse a tenant
//! that does not own the case.

use async_trait::async_trait;
use casebook_core::{CaseId, CasebookResult, FilterExpr, StoreError, TenantId};
use casebook_storage::{RetryExecutor, SelectQuery, StoreClient, StoreRequest};
use serde_json::Value;
use std::sync::Arc;

/// Looks up the owning tenant of a case.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// `Ok(None)` when the case exists but carries no tenant;
    /// `StoreError::NotFound` when the case does not exist.
    async fn tenant_of_case(&self, case_id: &CaseId) -> CasebookResult<Option<TenantId>>;
}

/// Resolver reading `cases.tenant_id` through the retry executor.
#[derive(Clone)]
pub struct StoreTenantResolver {
    store: Arc<dyn StoreClient>,
    retry: RetryExecutor,
}

impl StoreTenantResolver {
    pub fn new(store: Arc<dyn StoreClient>, retry: RetryExecutor) -> Self {
        Self { store, retry }
    }
}

const OPERATION: &str = "Resolver tenant de caso";

#[async_trait]
impl TenantResolver for StoreTenantResolver {
    async fn tenant_of_case(&self, case_id: &CaseId) -> CasebookResult<Option<TenantId>> {
        let request: StoreRequest = SelectQuery::from("cases")
            .columns("id,tenant_id")
            .filter(FilterExpr::eq("id", case_id.as_str()))
            .single()
            .into();

        let response = self
            .retry
            .execute(OPERATION, || self.store.execute(request.clone()))
            .await
            .map_err(|e| e.into_casebook_error(OPERATION))?;

        if let Some(failure) = response.error {
            return Err(StoreError::Reported {
                operation: OPERATION.to_string(),
                code: failure.code,
                message: failure.message,
            }
            .into());
        }

        let row = response.first_row().ok_or_else(|| StoreError::NotFound {
            entity: "case".to_string(),
            id: case_id.to_string(),
        })?;

        Ok(row
            .get("tenant_id")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .map(TenantId::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_core::CasebookError;
    use casebook_storage::MemoryStore;
    use serde_json::json;

    fn resolver(store: MemoryStore) -> StoreTenantResolver {
        StoreTenantResolver::new(Arc::new(store), RetryExecutor::default())
    }

    #[tokio::test]
    async fn test_resolves_case_tenant() {
        let store = MemoryStore::new().with_table(
            "cases",
            vec![
                json!({ "id": "c1", "tenant_id": "t1" }),
                json!({ "id": "c2", "tenant_id": null }),
            ],
        );
        let resolver = resolver(store);

        let tenant = resolver.tenant_of_case(&CaseId::new("c1")).await.unwrap();
        assert_eq!(tenant, Some(TenantId::new("t1")));

        let tenant = resolver.tenant_of_case(&CaseId::new("c2")).await.unwrap();
        assert_eq!(tenant, None);
    }

    #[tokio::test]
    async fn test_missing_case_is_not_found() {
        let resolver = resolver(MemoryStore::new());
        let err = resolver
            .tenant_of_case(&CaseId::new("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, CasebookError::Store(StoreError::NotFound { .. })));
    }
}
