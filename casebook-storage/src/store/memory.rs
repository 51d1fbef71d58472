//! In-process store
//!
//! Holds collections as JSON rows and evaluates [`StoreRequest`]s against
//! them: filters, text search, ordering, ranges, exact counts, embedded
//! relations and registered stored procedures. Scripted faults let tests
//! exercise retry and degradation paths deterministically.

use super::request::{Order, SelectQuery, StoreRequest, TextSearch};
use super::response::{StoreFailure, StoreResponse, TransportError};
use super::StoreClient;
use async_trait::async_trait;
use casebook_core::{new_record_id, FilterExpr};
use chrono::Utc;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Collections by name.
pub type Tables = HashMap<String, Vec<Value>>;

/// Stored procedure: receives the tables and the call parameters.
pub type RpcHandler = Arc<dyn Fn(&mut Tables, &Value) -> Result<Value, StoreFailure> + Send + Sync>;

/// A scripted failure consumed by the next call.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail the round trip.
    Transport(TransportError),
    /// Answer with a reported failure.
    Reported(StoreFailure),
    /// Never answer.
    Hang,
}

/// In-memory [`StoreClient`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    procedures: RwLock<HashMap<String, RpcHandler>>,
    faults: Mutex<VecDeque<Fault>>,
    log: Mutex<Vec<StoreRequest>>,
    calls: AtomicUsize,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemoryStore::seed`].
    pub fn with_table(self, collection: &str, rows: Vec<Value>) -> Self {
        self.seed(collection, rows);
        self
    }

    /// Append rows to a collection, creating it if needed.
    pub fn seed(&self, collection: &str, rows: Vec<Value>) {
        lock(&self.tables)
            .entry(collection.to_string())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a collection.
    pub fn rows(&self, collection: &str) -> Vec<Value> {
        lock(&self.tables)
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn register_rpc<F>(&self, name: &str, handler: F)
    where
        F: Fn(&mut Tables, &Value) -> Result<Value, StoreFailure> + Send + Sync + 'static,
    {
        self.procedures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Queue a fault for the next call.
    pub fn push_fault(&self, fault: Fault) {
        lock(&self.faults).push_back(fault);
    }

    /// Queue the same fault for the next `times` calls.
    pub fn fail_next(&self, times: usize, fault: Fault) {
        let mut faults = lock(&self.faults);
        faults.extend(std::iter::repeat(fault).take(times));
    }

    /// Number of `execute` calls, faulted ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(AtomicOrdering::SeqCst)
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<StoreRequest> {
        lock(&self.log).clone()
    }

    fn apply(&self, request: &StoreRequest) -> Result<StoreResponse, StoreFailure> {
        match request {
            StoreRequest::Select(query) => {
                let tables = lock(&self.tables);
                select(&tables, query)
            }
            StoreRequest::Insert {
                collection,
                rows,
                returning,
            } => {
                let mut tables = lock(&self.tables);
                let inserted = insert(&mut tables, collection, rows)?;
                Ok(StoreResponse::ok(Value::Array(embed_all(
                    &tables, collection, returning, inserted,
                ))))
            }
            StoreRequest::Update {
                collection,
                patch,
                filters,
                returning,
            } => {
                let mut tables = lock(&self.tables);
                let updated = update(&mut tables, collection, patch, filters)?;
                Ok(StoreResponse::ok(Value::Array(embed_all(
                    &tables, collection, returning, updated,
                ))))
            }
            StoreRequest::Rpc { function, params } => {
                let handler = self
                    .procedures
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(function)
                    .cloned()
                    .ok_or_else(|| {
                        StoreFailure::new(format!(
                            "Could not find the function public.{} in the schema cache",
                            function
                        ))
                        .with_code("PGRST202")
                        .with_status(404)
                    })?;
                let mut tables = lock(&self.tables);
                handler(&mut tables, params).map(StoreResponse::ok)
            }
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn execute(&self, request: StoreRequest) -> Result<StoreResponse, TransportError> {
        self.calls.fetch_add(1, AtomicOrdering::SeqCst);
        lock(&self.log).push(request.clone());

        let fault = lock(&self.faults).pop_front();
        match fault {
            Some(Fault::Transport(err)) => return Err(err),
            Some(Fault::Reported(failure)) => return Ok(StoreResponse::failed(failure)),
            Some(Fault::Hang) => std::future::pending::<()>().await,
            None => {}
        }

        Ok(self.apply(&request).unwrap_or_else(StoreResponse::failed))
    }
}

// ============================================================================
// EVALUATION
// ============================================================================

fn select(tables: &Tables, query: &SelectQuery) -> Result<StoreResponse, StoreFailure> {
    let mut rows: Vec<Value> = tables
        .get(&query.collection)
        .map(|rows| {
            rows.iter()
                .filter(|row| query.filters.iter().all(|f| f.matches(row)))
                .filter(|row| query.search.as_ref().map_or(true, |s| search_matches(s, row)))
                .cloned()
                .collect()
        })
        .unwrap_or_default();

    let total = rows.len() as u64;
    sort_rows(&mut rows, &query.order);

    if let Some((from, to)) = query.range {
        let take = to.saturating_sub(from).saturating_add(1);
        rows = rows
            .into_iter()
            .skip(usize::try_from(from).unwrap_or(usize::MAX))
            .take(usize::try_from(take).unwrap_or(usize::MAX))
            .collect();
    }

    let rows = embed_all(tables, &query.collection, &query.columns, rows);

    let data = if query.single {
        if rows.len() > 1 {
            return Err(StoreFailure::new(
                "JSON object requested, multiple (or no) rows returned",
            )
            .with_code("PGRST116")
            .with_status(406));
        }
        rows.into_iter().next().unwrap_or(Value::Null)
    } else {
        Value::Array(rows)
    };

    let response = StoreResponse::ok(data);
    Ok(if query.count {
        response.with_count(total)
    } else {
        response
    })
}

fn insert(
    tables: &mut Tables,
    collection: &str,
    rows: &[Value],
) -> Result<Vec<Value>, StoreFailure> {
    let table = tables.entry(collection.to_string()).or_default();
    let mut inserted = Vec::with_capacity(rows.len());

    for row in rows {
        let mut object = row
            .as_object()
            .cloned()
            .ok_or_else(|| StoreFailure::new("row must be a JSON object").with_code("22P02"))?;

        let id = object
            .entry("id")
            .or_insert_with(|| Value::String(new_record_id()))
            .clone();
        object
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        let duplicate = table
            .iter()
            .chain(inserted.iter())
            .any(|existing: &Value| existing.get("id") == Some(&id));
        if duplicate {
            return Err(StoreFailure::new(format!(
                "duplicate key value violates unique constraint \"{}_pkey\"",
                collection
            ))
            .with_code("23505")
            .with_status(409));
        }

        inserted.push(Value::Object(object));
    }

    table.extend(inserted.iter().cloned());
    Ok(inserted)
}

fn update(
    tables: &mut Tables,
    collection: &str,
    patch: &Value,
    filters: &[FilterExpr],
) -> Result<Vec<Value>, StoreFailure> {
    let patch = patch
        .as_object()
        .ok_or_else(|| StoreFailure::new("patch must be a JSON object").with_code("22P02"))?;

    let mut updated = Vec::new();
    if let Some(table) = tables.get_mut(collection) {
        for row in table.iter_mut() {
            if !filters.iter().all(|f| f.matches(row)) {
                continue;
            }
            if let Value::Object(object) = row {
                for (key, value) in patch {
                    object.insert(key.clone(), value.clone());
                }
            }
            updated.push(row.clone());
        }
    }
    Ok(updated)
}

fn search_matches(search: &TextSearch, row: &Value) -> bool {
    let term = search.term.to_lowercase();
    search.columns.iter().any(|column| {
        row.get(column)
            .and_then(Value::as_str)
            .is_some_and(|text| text.to_lowercase().contains(&term))
    })
}

fn sort_rows(rows: &mut [Value], order: &[Order]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        order
            .iter()
            .map(|key| {
                let ordering = compare_values(
                    a.get(&key.column).unwrap_or(&Value::Null),
                    b.get(&key.column).unwrap_or(&Value::Null),
                );
                match (a.get(&key.column), b.get(&key.column)) {
                    // nulls sort last in both directions
                    (None | Some(Value::Null), _) | (_, None | Some(Value::Null)) => ordering,
                    _ if key.ascending => ordering,
                    _ => ordering.reverse(),
                }
            })
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Attach embedded relations named in `columns` to each row.
fn embed_all(tables: &Tables, collection: &str, columns: &str, rows: Vec<Value>) -> Vec<Value> {
    let relations = SelectQuery::from(collection)
        .columns(columns)
        .embedded_relations();
    if relations.is_empty() {
        return rows;
    }

    rows.into_iter()
        .map(|mut row| {
            if let Value::Object(object) = &mut row {
                for relation in &relations {
                    let related = related_row(tables, relation, object);
                    object.insert(relation.clone(), related);
                }
            }
            row
        })
        .collect()
}

/// Many-to-one lookup through `<singular>_id`.
fn related_row(tables: &Tables, relation: &str, row: &Map<String, Value>) -> Value {
    let foreign_key = format!("{}_id", relation.strip_suffix('s').unwrap_or(relation));
    let Some(key) = row.get(&foreign_key).filter(|v| !v.is_null()) else {
        return Value::Null;
    };
    tables
        .get(relation)
        .and_then(|rows| rows.iter().find(|r| r.get("id") == Some(key)))
        .cloned()
        .unwrap_or(Value::Null)
}
