//! Store request model
//!
//! Requests are plain data so they can be logged, replayed by the retry
//! executor and evaluated by the in-memory store without an HTTP round trip.

use casebook_core::FilterExpr;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Case-insensitive substring match of one term against several columns.
/// A row matches when any column contains the term.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearch {
    pub columns: Vec<String>,
    pub term: String,
}

/// Sort key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Read from one collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub collection: String,
    /// Column list, including embedded relations such as `students(*)`
    pub columns: String,
    pub filters: Vec<FilterExpr>,
    pub search: Option<TextSearch>,
    pub order: Vec<Order>,
    /// Inclusive row range
    pub range: Option<(u64, u64)>,
    /// Ask the store for the exact unpaginated row count
    pub count: bool,
    /// Expect at most one row; `data` is an object or null
    pub single: bool,
}

impl SelectQuery {
    /// Select every column of a collection.
    pub fn from(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            columns: "*".to_string(),
            filters: Vec::new(),
            search: None,
            order: Vec::new(),
            range: None,
            count: false,
            single: false,
        }
    }

    pub fn columns(mut self, columns: impl Into<String>) -> Self {
        self.columns = columns.into();
        self
    }

    pub fn filter(mut self, filter: FilterExpr) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn search(mut self, columns: &[&str], term: impl Into<String>) -> Self {
        self.search = Some(TextSearch {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            term: term.into(),
        });
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }

    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    /// Names of the relations embedded in the column list, e.g. `students`
    /// for `*, students(*)`.
    pub fn embedded_relations(&self) -> Vec<String> {
        self.columns
            .split(',')
            .filter_map(|part| {
                let part = part.trim();
                let open = part.find('(')?;
                let name = part[..open].trim();
                // `alias:relation(...)` embeds `relation`
                let name = name.rsplit(':').next().unwrap_or(name).trim();
                (!name.is_empty()).then(|| name.to_string())
            })
            .collect()
    }
}

/// One round trip to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreRequest {
    Select(SelectQuery),
    Insert {
        collection: String,
        rows: Vec<Value>,
        /// Columns returned for the inserted rows
        returning: String,
    },
    Update {
        collection: String,
        patch: Value,
        filters: Vec<FilterExpr>,
        returning: String,
    },
    Rpc {
        function: String,
        params: Value,
    },
}

impl StoreRequest {
    /// Insert rows and return them.
    pub fn insert(collection: impl Into<String>, rows: Vec<Value>) -> Self {
        StoreRequest::Insert {
            collection: collection.into(),
            rows,
            returning: "*".to_string(),
        }
    }

    /// Patch every row matching `filters` and return the updated rows.
    pub fn update(collection: impl Into<String>, patch: Value, filters: Vec<FilterExpr>) -> Self {
        StoreRequest::Update {
            collection: collection.into(),
            patch,
            filters,
            returning: "*".to_string(),
        }
    }

    /// Call a stored procedure.
    pub fn rpc(function: impl Into<String>, params: Value) -> Self {
        StoreRequest::Rpc {
            function: function.into(),
            params,
        }
    }

    /// Override the returned columns of an insert or update.
    pub fn returning(mut self, columns: impl Into<String>) -> Self {
        match &mut self {
            StoreRequest::Insert { returning, .. } | StoreRequest::Update { returning, .. } => {
                *returning = columns.into();
            }
            StoreRequest::Select(query) => query.columns = columns.into(),
            StoreRequest::Rpc { .. } => {}
        }
        self
    }

    /// Collection or procedure the request targets.
    pub fn target(&self) -> &str {
        match self {
            StoreRequest::Select(query) => &query.collection,
            StoreRequest::Insert { collection, .. } | StoreRequest::Update { collection, .. } => {
                collection
            }
            StoreRequest::Rpc { function, .. } => function,
        }
    }

    /// Short verb for logs.
    pub fn verb(&self) -> &'static str {
        match self {
            StoreRequest::Select(_) => "select",
            StoreRequest::Insert { .. } => "insert",
            StoreRequest::Update { .. } => "update",
            StoreRequest::Rpc { .. } => "rpc",
        }
    }

    pub fn is_mutation(&self) -> bool {
        !matches!(self, StoreRequest::Select(_))
    }
}

impl From<SelectQuery> for StoreRequest {
    fn from(query: SelectQuery) -> Self {
        StoreRequest::Select(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_builder() {
        let query = SelectQuery::from("cases")
            .columns("*, students(*)")
            .filter(FilterExpr::eq("tenant_id", "t1"))
            .order_by("created_at", false)
            .range(0, 24)
            .with_count();

        assert_eq!(query.collection, "cases");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.range, Some((0, 24)));
        assert!(query.count);
        assert!(!query.single);
    }

    #[test]
    fn test_embedded_relations() {
        let query = SelectQuery::from("cases").columns("*, students(*), owner:profiles(id, name)");
        assert_eq!(query.embedded_relations(), vec!["students", "profiles"]);
        assert!(SelectQuery::from("cases").embedded_relations().is_empty());
    }

    #[test]
    fn test_request_target_and_verb() {
        let insert = StoreRequest::insert("cases", vec![json!({"id": "c1"})]);
        assert_eq!(insert.target(), "cases");
        assert_eq!(insert.verb(), "insert");
        assert!(insert.is_mutation());

        let rpc = StoreRequest::rpc("start_case_followup", json!({"p_case_id": "c1"}));
        assert_eq!(rpc.target(), "start_case_followup");
        assert!(!StoreRequest::from(SelectQuery::from("cases")).is_mutation());
    }

    #[test]
    fn test_returning_overrides_columns() {
        let update = StoreRequest::update("cases", json!({"status": "cerrado"}), vec![])
            .returning("*, students(*)");
        match update {
            StoreRequest::Update { returning, .. } => assert_eq!(returning, "*, students(*)"),
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
