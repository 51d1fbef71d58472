//! Query/mutation layer
//!
//! [`DataClient`] turns domain operations into store requests, runs them
//! through the retry executor, maps and tenant-checks the rows that come
//! back, and keeps the aggregate caches coherent with every write.
//!
//! Failure policy:
//! - precondition violations are `Validation` errors raised before any I/O
//! - an unknown tenant never fails an operation; it is reported and the
//!   operation proceeds (writes) or returns nothing (tenant-scoped listings)
//! - a write under a case owned by another tenant is reported and fails as
//!   not found
//! - rows that cannot be decoded are skipped in listings and fail
//!   single-record operations

use crate::guard::TenantGuard;
use crate::monitor::{monitor_from_config, TracingMonitor};
use crate::plazos::summarize_many;
use crate::resolver::{StoreTenantResolver, TenantResolver};
use crate::rows::{
    case_from_row, case_patch_row, catalog_entry_from_row, close_case_row, decode_rows,
    followup_from_row, new_case_row, new_followup_row, CASE_COLUMNS,
};
use crate::search::sanitize_search;
use casebook_core::monitor::{CASE_WITHOUT_TENANT, TENANT_UNRESOLVED};
use casebook_core::{
    new_record_id, Case, CaseFilter, CaseId, CasePage, CasePatch, CaseStats, CaseStatus,
    CasebookConfig, CasebookError, CasebookResult, CatalogEntry, FilterExpr, Followup,
    FollowupId, Monitor, NewCase, NewFollowup, Page, PlazoSummary, ProcessStage, StageStatus,
    StoreError, TenantId, ValidationError,
};
use casebook_storage::{
    CacheKey, CacheStore, CredentialProvider, RestStoreClient, RetryExecutor, RetryPolicy,
    SelectQuery, StoreClient, StoreRequest, StoreResponse,
};
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

const CASES: &str = "cases";
const FOLLOWUPS: &str = "case_followups";
const CATALOGS: &str = "catalogs";

/// Columns matched by free-text case search.
const SEARCH_COLUMNS: &[&str] = &["description", "course", "conduct_type"];

/// Store procedure moving a case into follow-up.
const START_FOLLOWUP_RPC: &str = "start_case_followup";

/// Action type of the follow-up created when a process starts.
pub const INITIAL_FOLLOWUP_ACTION: &str = "Inicio de seguimiento";

const SQLSTATE_UNIQUE_VIOLATION: &str = "23505";

/// Results of the concurrent dashboard reads. Each half fails on its own.
#[derive(Debug)]
pub struct DashboardSnapshot {
    pub cases: CasebookResult<CasePage>,
    pub stats: CasebookResult<CaseStats>,
}

/// Tenant-isolated access to cases, follow-ups and their aggregates.
#[derive(Clone)]
pub struct DataClient {
    store: Arc<dyn StoreClient>,
    retry: RetryExecutor,
    cache: CacheStore,
    guard: TenantGuard,
    resolver: Option<Arc<dyn TenantResolver>>,
    context_tenant: Option<TenantId>,
}

impl std::fmt::Debug for DataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataClient")
            .field("retry", self.retry.policy())
            .field("cache", &self.cache)
            .field("context_tenant", &self.context_tenant)
            .finish_non_exhaustive()
    }
}

impl DataClient {
    /// Client with the default retry policy, an in-process cache and the
    /// tracing monitor.
    pub fn new(store: Arc<dyn StoreClient>) -> Self {
        Self {
            store,
            retry: RetryExecutor::default(),
            cache: CacheStore::in_memory(),
            guard: TenantGuard::new(Arc::new(TracingMonitor)),
            resolver: None,
            context_tenant: None,
        }
    }

    /// Build every collaborator from configuration.
    pub fn from_config(
        config: &CasebookConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> CasebookResult<Self> {
        config.validate()?;
        let store = RestStoreClient::new(&config.store, credentials)?;
        Ok(Self::new(Arc::new(store))
            .with_retry_policy(RetryPolicy::from(&config.retry))
            .with_cache(CacheStore::from_config(&config.cache)?)
            .with_monitor(monitor_from_config(&config.monitor)?))
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = RetryExecutor::new(policy);
        self
    }

    pub fn with_cache(mut self, cache: CacheStore) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.guard = TenantGuard::new(monitor);
        self
    }

    /// Replace the store-backed tenant resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn TenantResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Tenant of the calling session, used when a request names none.
    pub fn with_tenant(mut self, tenant_id: TenantId) -> Self {
        self.context_tenant = Some(tenant_id);
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn context_tenant(&self) -> Option<&TenantId> {
        self.context_tenant.as_ref()
    }

    // ========================================================================
    // CASES
    // ========================================================================

    /// One page of a tenant's cases, newest first, with the exact total.
    pub async fn list_cases(&self, filter: &CaseFilter, page: Page) -> CasebookResult<CasePage> {
        const OP: &str = "Listar casos";

        let Some(tenant) = self.scope(filter.tenant_id.as_ref()).cloned() else {
            self.guard
                .monitor()
                .notify(TENANT_UNRESOLVED, json!({ "operation": OP }));
            return Ok(CasePage::empty());
        };

        if matches!(&filter.status, Some(statuses) if statuses.is_empty()) {
            return Ok(CasePage::empty());
        }

        let search = match filter.search.as_deref() {
            Some(raw) if !raw.trim().is_empty() => match sanitize_search(raw) {
                Some(term) => Some(term),
                None => return Ok(CasePage::empty()),
            },
            _ => None,
        };

        let mut query = SelectQuery::from(CASES)
            .columns(CASE_COLUMNS)
            .filter(FilterExpr::eq("tenant_id", tenant.as_str()));
        if let Some(statuses) = &filter.status {
            query = query.filter(FilterExpr::in_list(
                "status",
                statuses.iter().map(|s| s.as_db_str().to_string()),
            ));
        }
        if let Some(term) = search {
            query = query.search(SEARCH_COLUMNS, term);
        }
        if let Some(from) = filter.from_date {
            query = query.filter(FilterExpr::gte("incident_date", from.to_string()));
        }
        if let Some(to) = filter.to_date {
            query = query.filter(FilterExpr::lte("incident_date", to.to_string()));
        }
        let (from, to) = page.range();
        let query = query
            .order_by("created_at", false)
            .range(from, to)
            .with_count();

        let response = self.run(OP, query.into()).await?;
        let total = response.count.unwrap_or(response.rows().len() as u64);
        let rows = self.guarded_cases(response.rows(), Some(&tenant));

        debug!(tenant_id = %tenant, rows = rows.len(), total, "Listed cases");
        Ok(CasePage { rows, total })
    }

    pub async fn get_case(&self, id: &CaseId) -> CasebookResult<Option<Case>> {
        const OP: &str = "Obtener caso";
        require_case_id(id)?;

        let query = SelectQuery::from(CASES)
            .columns(CASE_COLUMNS)
            .filter(FilterExpr::eq("id", id.as_str()))
            .single();
        let response = self.run(OP, query.into()).await?;
        let Some(row) = response.first_row() else {
            return Ok(None);
        };

        let case = case_from_row(&row)?;
        let scope = self.scope(None);
        if !self.guard.admits(&case, scope) {
            return Ok(None);
        }
        Ok(Some(self.guard.sanitize(case, scope)))
    }

    /// Cases for the given ids, in request order. Unknown ids are omitted.
    pub async fn get_cases_by_ids(&self, ids: &[CaseId]) -> CasebookResult<Vec<Case>> {
        const OP: &str = "Obtener casos";

        let ids = distinct_ids(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = SelectQuery::from(CASES)
            .columns(CASE_COLUMNS)
            .filter(FilterExpr::in_list("id", ids.iter().map(|id| id.to_string())));
        let response = self.run(OP, query.into()).await?;

        let mut by_id: HashMap<CaseId, Case> = self
            .guarded_cases(response.rows(), self.scope(None))
            .into_iter()
            .map(|case| (case.id.clone(), case))
            .collect();
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    pub async fn create_case(&self, payload: &NewCase) -> CasebookResult<Case> {
        const OP: &str = "Crear caso";

        if payload.incident_date.is_none() {
            return Err(ValidationError::missing(
                "incident_date",
                "Se requiere fecha del incidente",
            )
            .into());
        }
        if payload
            .conduct_type
            .as_deref()
            .map_or(true, |t| t.trim().is_empty())
        {
            return Err(
                ValidationError::missing("conduct_type", "Se requiere tipo de conducta").into(),
            );
        }

        let tenant = self.scope(payload.tenant_id.as_ref()).cloned();
        let id = CaseId::new(new_record_id());
        if tenant.is_none() {
            self.guard.monitor().notify(
                CASE_WITHOUT_TENANT,
                json!({ "operation": OP, "case_id": id.as_str() }),
            );
            warn!(case_id = %id, "Creating case without tenant");
        }

        let row = new_case_row(&id, payload, tenant.as_ref());
        let created = self
            .insert_returning(OP, CASES, id.as_str(), row, CASE_COLUMNS)
            .await?;
        let case = case_from_row(&created)?;

        self.invalidate_stats(case.tenant_id.as_ref().or(tenant.as_ref()))
            .await;
        Ok(self.guard.sanitize(case, tenant.as_ref()))
    }

    pub async fn update_case(&self, id: &CaseId, patch: &CasePatch) -> CasebookResult<Case> {
        const OP: &str = "Actualizar caso";
        require_case_id(id)?;

        if patch.is_empty() {
            return self.get_case(id).await?.ok_or_else(|| not_found(id));
        }
        self.patch_case(OP, id, case_patch_row(patch)?).await
    }

    /// Close a case, recording when and by whom.
    pub async fn close_case(&self, id: &CaseId, actor: &str) -> CasebookResult<Case> {
        const OP: &str = "Cerrar caso";
        require_case_id(id)?;

        let actor = Some(actor.trim()).filter(|a| !a.is_empty());
        self.patch_case(OP, id, close_case_row(actor, Utc::now()))
            .await
    }

    async fn patch_case(&self, operation: &str, id: &CaseId, body: Value) -> CasebookResult<Case> {
        let scope = self.scope(None);
        let mut filters = vec![FilterExpr::eq("id", id.as_str())];
        if let Some(tenant) = scope {
            filters.push(FilterExpr::eq("tenant_id", tenant.as_str()));
        }

        let request = StoreRequest::update(CASES, body, filters).returning(CASE_COLUMNS);
        let response = self.run(operation, request).await?;
        let row = response.first_row().ok_or_else(|| not_found(id))?;
        let case = case_from_row(&row)?;

        self.invalidate_stats(case.tenant_id.as_ref().or(scope)).await;
        Ok(self.guard.sanitize(case, scope))
    }

    // ========================================================================
    // FOLLOW-UPS
    // ========================================================================

    /// Follow-ups of a case ordered by action date.
    pub async fn list_followups(&self, case_id: &CaseId) -> CasebookResult<Vec<Followup>> {
        const OP: &str = "Listar seguimientos";
        if case_id.is_blank() {
            return Err(missing_case_id());
        }

        let query = SelectQuery::from(FOLLOWUPS)
            .filter(FilterExpr::eq("case_id", case_id.as_str()))
            .order_by("action_date", true)
            .order_by("created_at", true);
        let response = self.run(OP, query.into()).await?;
        Ok(self.guarded_followups(response.rows()))
    }

    pub async fn create_followup(&self, payload: &NewFollowup) -> CasebookResult<Followup> {
        const OP: &str = "Crear seguimiento";

        let case_id = payload
            .case_id
            .as_ref()
            .filter(|id| !id.is_blank())
            .ok_or_else(missing_case_id)?;
        let stage = payload.process_stage.ok_or_else(|| {
            CasebookError::from(ValidationError::missing(
                "process_stage",
                "Se requiere process_stage",
            ))
        })?;

        let tenant = self
            .case_tenant(OP, payload.tenant_id.as_ref(), case_id)
            .await?;
        self.insert_followup(OP, case_id, stage, payload, tenant.as_ref())
            .await
    }

    async fn insert_followup(
        &self,
        operation: &str,
        case_id: &CaseId,
        stage: ProcessStage,
        payload: &NewFollowup,
        tenant: Option<&TenantId>,
    ) -> CasebookResult<Followup> {
        let id = FollowupId::new(new_record_id());
        let today = Utc::now().date_naive();
        let row = new_followup_row(&id, case_id, stage, payload, tenant, today);
        let created = self
            .insert_returning(operation, FOLLOWUPS, id.as_str(), row, "*")
            .await?;
        let followup = followup_from_row(&created)?;

        if let Some(tenant) = tenant {
            self.cache
                .invalidate(CacheKey::plazos(tenant, case_id.as_str()))
                .await;
        }
        Ok(followup)
    }

    /// Move a case into follow-up and open its first stage.
    ///
    /// Idempotent: calling it again returns `true` without creating a
    /// second initial follow-up.
    pub async fn start_seguimiento(&self, case_id: &CaseId) -> CasebookResult<bool> {
        const OP: &str = "Iniciar seguimiento";
        require_case_id(case_id)?;

        let tenant = self.case_tenant(OP, None, case_id).await?;

        self.run(
            OP,
            StoreRequest::rpc(START_FOLLOWUP_RPC, json!({ "p_case_id": case_id.as_str() })),
        )
        .await?;

        if self.has_followups(case_id).await? {
            debug!(case_id = %case_id, "Follow-up already started");
        } else {
            let initial = NewFollowup {
                action_type: Some(INITIAL_FOLLOWUP_ACTION.to_string()),
                stage_status: Some(StageStatus::EnCurso),
                ..NewFollowup::for_case(case_id.clone(), ProcessStage::Reporte)
            };
            self.insert_followup(OP, case_id, ProcessStage::Reporte, &initial, tenant.as_ref())
                .await?;
        }

        self.invalidate_stats(tenant.as_ref()).await;
        Ok(true)
    }

    async fn has_followups(&self, case_id: &CaseId) -> CasebookResult<bool> {
        const OP: &str = "Consultar seguimientos";
        let query = SelectQuery::from(FOLLOWUPS)
            .columns("id")
            .filter(FilterExpr::eq("case_id", case_id.as_str()))
            .range(0, 0);
        let response = self.run(OP, query.into()).await?;
        Ok(!response.rows().is_empty())
    }

    // ========================================================================
    // AGGREGATES
    // ========================================================================

    /// Deadline summaries for the given cases as of today.
    pub async fn get_plazos_resumen_many(
        &self,
        case_ids: &[CaseId],
    ) -> CasebookResult<HashMap<CaseId, PlazoSummary>> {
        self.get_plazos_resumen_many_as_of(case_ids, Utc::now().date_naive())
            .await
    }

    /// Deadline summaries computed against `today`. Cached per case when a
    /// tenant scope is known.
    pub async fn get_plazos_resumen_many_as_of(
        &self,
        case_ids: &[CaseId],
        today: NaiveDate,
    ) -> CasebookResult<HashMap<CaseId, PlazoSummary>> {
        const OP: &str = "Resumen de plazos";

        let ids = distinct_ids(case_ids);
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let scope = self.scope(None).cloned();
        let mut summaries = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            let cached = match &scope {
                Some(tenant) => {
                    self.cache
                        .get::<PlazoSummary>(&CacheKey::plazos(tenant, id.as_str()))
                        .await
                }
                None => None,
            };
            match cached {
                Some(summary) => {
                    summaries.insert(id, summary);
                }
                None => missing.push(id),
            }
        }
        if missing.is_empty() {
            return Ok(summaries);
        }

        let query = SelectQuery::from(FOLLOWUPS)
            .filter(FilterExpr::in_list(
                "case_id",
                missing.iter().map(|id| id.to_string()),
            ))
            .order_by("action_date", true);
        let response = self.run(OP, query.into()).await?;
        let followups = self.guarded_followups(response.rows());

        for (id, summary) in summarize_many(&missing, followups, today) {
            if let Some(tenant) = &scope {
                self.cache
                    .put(&CacheKey::plazos(tenant, id.as_str()), &summary)
                    .await;
            }
            summaries.insert(id, summary);
        }
        Ok(summaries)
    }

    /// Case counts per status for a tenant.
    pub async fn tenant_stats(&self, tenant_id: &TenantId) -> CasebookResult<CaseStats> {
        if tenant_id.is_blank() {
            return Err(ValidationError::missing("tenant_id", "Se requiere tenant_id").into());
        }
        self.cache
            .tenant_stats_or_load(tenant_id, || self.load_tenant_stats(tenant_id))
            .await
    }

    async fn load_tenant_stats(&self, tenant_id: &TenantId) -> CasebookResult<CaseStats> {
        const OP: &str = "Estadísticas de casos";

        let query = SelectQuery::from(CASES)
            .columns("id,tenant_id,status")
            .filter(FilterExpr::eq("tenant_id", tenant_id.as_str()));
        let response = self.run(OP, query.into()).await?;

        let mut by_status: BTreeMap<String, u64> = CaseStatus::known()
            .iter()
            .map(|s| (s.as_db_str().to_string(), 0))
            .collect();
        let mut total = 0;
        for row in response.rows() {
            let status = row
                .get("status")
                .and_then(Value::as_str)
                .map(CaseStatus::from_db_str)
                .unwrap_or_default();
            *by_status.entry(status.as_db_str().to_string()).or_default() += 1;
            total += 1;
        }

        Ok(CaseStats {
            tenant_id: Some(tenant_id.clone()),
            total,
            by_status,
        })
    }

    /// Entries of a shared lookup catalog.
    pub async fn catalog(&self, name: &str) -> CasebookResult<Vec<CatalogEntry>> {
        const OP: &str = "Obtener catálogo";

        let name = name.trim();
        if name.is_empty() {
            return Err(
                ValidationError::missing("catalog", "Se requiere nombre de catálogo").into(),
            );
        }

        self.cache
            .catalog_or_load(name, || async move {
                let query = SelectQuery::from(CATALOGS)
                    .filter(FilterExpr::eq("catalog", name))
                    .order_by("label", true);
                let response = self.run(OP, query.into()).await?;
                Ok::<_, CasebookError>(decode_rows(
                    response.rows(),
                    "catalog entry",
                    catalog_entry_from_row,
                ))
            })
            .await
    }

    /// Case listing and tenant counts fetched concurrently.
    pub async fn dashboard(
        &self,
        tenant_id: &TenantId,
        filter: &CaseFilter,
        page: Page,
    ) -> DashboardSnapshot {
        let filter = CaseFilter {
            tenant_id: Some(tenant_id.clone()),
            ..filter.clone()
        };
        let (cases, stats) = tokio::join!(
            self.list_cases(&filter, page),
            self.tenant_stats(tenant_id)
        );
        DashboardSnapshot { cases, stats }
    }

    // ========================================================================
    // PLUMBING
    // ========================================================================

    /// One store round trip under the retry policy. A failure the store
    /// reported becomes a `StoreError` carrying its message.
    async fn run(&self, operation: &str, request: StoreRequest) -> CasebookResult<StoreResponse> {
        debug!(operation, verb = request.verb(), collection = request.target(), "Store request");
        let response = self
            .retry
            .execute(operation, || self.store.execute(request.clone()))
            .await
            .map_err(|e| e.into_casebook_error(operation))?;

        match response.error {
            Some(failure) => Err(StoreError::Reported {
                operation: operation.to_string(),
                code: failure.code,
                message: failure.message,
            }
            .into()),
            None => Ok(response),
        }
    }

    /// Insert one row with a client-generated id and return it.
    ///
    /// A retried insert whose first attempt reached the store fails with a
    /// unique violation on that id; the stored row is returned instead. A
    /// violation on any other constraint leaves no row under the id, and the
    /// store's failure is returned unchanged.
    async fn insert_returning(
        &self,
        operation: &str,
        collection: &str,
        id: &str,
        row: Value,
        columns: &str,
    ) -> CasebookResult<Value> {
        let request = StoreRequest::insert(collection, vec![row]).returning(columns);
        match self.run(operation, request).await {
            Ok(response) => response.first_row().ok_or_else(|| {
                StoreError::EmptyResult {
                    operation: operation.to_string(),
                }
                .into()
            }),
            Err(err) if is_unique_violation(&err) => {
                let query = SelectQuery::from(collection)
                    .columns(columns)
                    .filter(FilterExpr::eq("id", id))
                    .single();
                match self.run(operation, query.into()).await?.first_row() {
                    Some(row) => {
                        debug!(operation, id, "Insert already applied, read it back");
                        Ok(row)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Tenant a write under `case_id` belongs to, checked against the
    /// tenant the caller acts for.
    async fn case_tenant(
        &self,
        operation: &str,
        explicit: Option<&TenantId>,
        case_id: &CaseId,
    ) -> CasebookResult<Option<TenantId>> {
        let resolver = self.resolver();
        self.guard
            .resolve_tenant(
                operation,
                self.scope(explicit),
                Some(case_id),
                resolver.as_ref(),
            )
            .await
    }

    fn resolver(&self) -> Arc<dyn TenantResolver> {
        match &self.resolver {
            Some(resolver) => resolver.clone(),
            None => Arc::new(StoreTenantResolver::new(
                self.store.clone(),
                self.retry.clone(),
            )),
        }
    }

    /// Explicit tenant when present, otherwise the session tenant.
    fn scope<'a>(&'a self, explicit: Option<&'a TenantId>) -> Option<&'a TenantId> {
        explicit
            .filter(|t| !t.is_blank())
            .or_else(|| self.context_tenant.as_ref().filter(|t| !t.is_blank()))
    }

    fn guarded_cases(&self, rows: Vec<Value>, scope: Option<&TenantId>) -> Vec<Case> {
        let admitted = decode_rows(rows, "case", case_from_row)
            .into_iter()
            .filter(|case| self.guard.admits(case, scope))
            .collect();
        self.guard.sanitize_all(admitted, scope)
    }

    fn guarded_followups(&self, rows: Vec<Value>) -> Vec<Followup> {
        let scope = self.scope(None);
        decode_rows(rows, "followup", followup_from_row)
            .into_iter()
            .filter(|followup| self.guard.admits(followup, scope))
            .collect()
    }

    async fn invalidate_stats(&self, tenant_id: Option<&TenantId>) {
        if let Some(tenant_id) = tenant_id.filter(|t| !t.is_blank()) {
            self.cache.invalidate_tenant_stats(tenant_id).await;
        }
    }
}

fn require_case_id(id: &CaseId) -> CasebookResult<()> {
    if id.is_blank() {
        return Err(ValidationError::missing("id", "Se requiere id de caso").into());
    }
    Ok(())
}

fn is_unique_violation(err: &CasebookError) -> bool {
    matches!(
        err,
        CasebookError::Store(StoreError::Reported { code: Some(code), .. })
            if code == SQLSTATE_UNIQUE_VIOLATION
    )
}

fn missing_case_id() -> CasebookError {
    ValidationError::missing("case_id", "Se requiere case_id").into()
}

fn not_found(id: &CaseId) -> CasebookError {
    StoreError::NotFound {
        entity: "case".to_string(),
        id: id.to_string(),
    }
    .into()
}

/// Non-blank ids, first occurrence kept.
fn distinct_ids(ids: &[CaseId]) -> Vec<CaseId> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| !id.is_blank() && seen.insert((*id).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use casebook_storage::MemoryStore;

    fn client(store: MemoryStore) -> (DataClient, Arc<MemoryStore>) {
        let store = Arc::new(store);
        (DataClient::new(store.clone()), store)
    }

    #[test]
    fn test_distinct_ids() {
        let ids = vec![
            CaseId::new("a"),
            CaseId::new(" "),
            CaseId::new("b"),
            CaseId::new("a"),
        ];
        assert_eq!(distinct_ids(&ids), vec![CaseId::new("a"), CaseId::new("b")]);
    }

    #[tokio::test]
    async fn test_blank_id_fails_before_io() {
        let (client, store) = client(MemoryStore::new());
        let err = client.get_case(&CaseId::new("")).await.unwrap_err();
        assert_eq!(err.to_string(), "Se requiere id de caso");
        let err = client.close_case(&CaseId::new(" "), "x").await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_list_without_scope_is_empty() {
        let (client, store) = client(MemoryStore::new());
        let page = client
            .list_cases(&CaseFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(page, CasePage::empty());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_catalog_is_cached() {
        let (client, store) = client(MemoryStore::new().with_table(
            CATALOGS,
            vec![
                json!({ "catalog": "conduct_types", "code": "agresion", "label": "Agresión" }),
                json!({ "catalog": "courses", "code": "1A", "label": "1° A" }),
            ],
        ));

        let first = client.catalog("conduct_types").await.unwrap();
        let second = client.catalog("conduct_types").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
        assert_eq!(store.call_count(), 1);
    }
}
