//! PostgREST-style HTTP store client
//!
//! Translates [`StoreRequest`]s into REST calls:
//!
//! - `GET  /rest/v1/{collection}?select=..&{column}={op}.{value}`
//! - `POST /rest/v1/{collection}` with `Prefer: return=representation`
//! - `PATCH /rest/v1/{collection}?{filters}`
//! - `POST /rest/v1/rpc/{function}`
//!
//! Exact counts are requested with `Prefer: count=exact` and read back from
//! `Content-Range`. Non-2xx answers become reported failures; only failures
//! to complete the round trip are [`TransportError`]s.

use super::request::{Order, SelectQuery, StoreRequest, TextSearch};
use super::response::{StoreFailure, StoreResponse, TransportError, TransportErrorKind};
use super::StoreClient;
use async_trait::async_trait;
use casebook_core::{CasebookResult, ConfigError, FilterExpr, FilterOperator, StoreConfig};
use reqwest::header::{AUTHORIZATION, CONTENT_RANGE};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Supplies the bearer credential for each request.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token, if the caller is signed in.
    async fn bearer_token(&self) -> Option<String>;
}

/// Fixed credential, e.g. a service key.
#[derive(Debug, Clone, Default)]
pub struct StaticCredential {
    token: Option<String>,
}

impl StaticCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// No bearer token; requests fall back to the project API key.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }
}

/// [`StoreClient`] speaking the PostgREST dialect over reqwest.
#[derive(Clone)]
pub struct RestStoreClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    schema: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for RestStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStoreClient")
            .field("base_url", &self.base_url)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl RestStoreClient {
    pub fn new(
        config: &StoreConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> CasebookResult<Self> {
        config.validate()?;

        // Per-attempt deadlines are enforced by the retry executor.
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "CASEBOOK_STORE_URL".to_string(),
                value: config.url.clone(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            schema: config.schema.clone(),
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    async fn build(&self, request: &StoreRequest) -> reqwest::RequestBuilder {
        let builder = match request {
            StoreRequest::Select(query) => {
                let mut builder = self
                    .http
                    .get(self.url(&query.collection))
                    .query(&select_params(query))
                    .header("Accept-Profile", &self.schema);
                if query.count {
                    builder = builder.header("Prefer", "count=exact");
                }
                builder
            }
            StoreRequest::Insert {
                collection,
                rows,
                returning,
            } => self
                .http
                .post(self.url(collection))
                .query(&[("select", returning.as_str())])
                .header("Content-Profile", &self.schema)
                .header("Prefer", "return=representation")
                .json(rows),
            StoreRequest::Update {
                collection,
                patch,
                filters,
                returning,
            } => {
                let mut params = vec![("select".to_string(), returning.clone())];
                params.extend(filters.iter().map(filter_param));
                self.http
                    .patch(self.url(collection))
                    .query(&params)
                    .header("Content-Profile", &self.schema)
                    .header("Prefer", "return=representation")
                    .json(patch)
            }
            StoreRequest::Rpc { function, params } => self
                .http
                .post(self.url(&format!("rpc/{}", function)))
                .header("Content-Profile", &self.schema)
                .json(params),
        };

        let token = match self.credentials.bearer_token().await {
            Some(token) => Some(token),
            None => self.api_key.clone(),
        };

        let mut builder = builder.header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            builder = builder.header("apikey", key);
        }
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        builder
    }
}

#[async_trait]
impl StoreClient for RestStoreClient {
    async fn execute(&self, request: StoreRequest) -> Result<StoreResponse, TransportError> {
        let single = matches!(&request, StoreRequest::Select(query) if query.single);

        let response = self
            .build(&request)
            .await
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            tracing::debug!(
                collection = request.target(),
                verb = request.verb(),
                status = status.as_u16(),
                "Store reported failure"
            );
            return Ok(StoreResponse::failed(failure_from_body(
                status.as_u16(),
                status.canonical_reason(),
                &body,
            )));
        }

        let data = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body)
                .map_err(|e| TransportError::new(TransportErrorKind::Decode, e.to_string()))?
        };

        let data = match (single, data) {
            (true, Value::Array(rows)) => rows.into_iter().next().unwrap_or(Value::Null),
            (_, data) => data,
        };

        Ok(StoreResponse {
            data,
            error: None,
            count: total,
        })
    }
}

// ============================================================================
// QUERY TRANSLATION
// ============================================================================

fn select_params(query: &SelectQuery) -> Vec<(String, String)> {
    let mut params = vec![("select".to_string(), query.columns.replace(' ', ""))];
    params.extend(query.filters.iter().map(filter_param));
    if let Some(search) = &query.search {
        params.push(search_param(search));
    }
    if !query.order.is_empty() {
        params.push(("order".to_string(), order_param(&query.order)));
    }
    if let Some((from, to)) = query.range {
        params.push(("offset".to_string(), from.to_string()));
        params.push((
            "limit".to_string(),
            to.saturating_sub(from).saturating_add(1).to_string(),
        ));
    }
    params
}

fn filter_param(filter: &FilterExpr) -> (String, String) {
    let value = match filter.operator {
        FilterOperator::IsNull => "is.null".to_string(),
        FilterOperator::In => {
            let items: Vec<String> = filter
                .value
                .as_array()
                .map(|values| values.iter().map(list_item).collect())
                .unwrap_or_default();
            format!("in.({})", items.join(","))
        }
        op => format!("{}.{}", op.as_str(), scalar(&filter.value)),
    };
    (filter.field.clone(), value)
}

fn search_param(search: &TextSearch) -> (String, String) {
    let clauses: Vec<String> = search
        .columns
        .iter()
        .map(|column| format!("{}.ilike.*{}*", column, search.term))
        .collect();
    ("or".to_string(), format!("({})", clauses.join(",")))
}

fn order_param(order: &[Order]) -> String {
    order
        .iter()
        .map(|o| {
            let direction = if o.ascending { "asc" } else { "desc" };
            format!("{}.{}.nullslast", o.column, direction)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// List items containing reserved characters are double-quoted.
fn list_item(value: &Value) -> String {
    let text = scalar(value);
    if text.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", text.replace('"', "\\\""))
    } else {
        text
    }
}

/// Total from `Content-Range: 0-24/120` (or `*/0`).
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit('/').next()?.trim().parse().ok()
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

fn failure_from_body(status: u16, reason: Option<&str>, body: &str) -> StoreFailure {
    let fallback = || {
        let text = body.trim();
        if text.is_empty() {
            reason.unwrap_or("request failed").to_string()
        } else {
            text.to_string()
        }
    };

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => StoreFailure {
            code: parsed.code,
            message: parsed.message.unwrap_or_else(fallback),
            details: parsed.details,
            hint: parsed.hint,
            status: Some(status),
        },
        Err(_) => StoreFailure::new(fallback()).with_status(status),
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    let mut chain = err.to_string();
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        chain.push_str(": ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    let lowered = chain.to_lowercase();

    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_builder() {
        TransportErrorKind::Request
    } else if err.is_decode() {
        TransportErrorKind::Decode
    } else if lowered.contains("dns") || lowered.contains("resolve") {
        TransportErrorKind::Dns
    } else if lowered.contains("refused") {
        TransportErrorKind::ConnectionRefused
    } else if lowered.contains("reset") {
        TransportErrorKind::ConnectionReset
    } else if lowered.contains("aborted") || lowered.contains("broken pipe") {
        TransportErrorKind::ConnectionAborted
    } else if err.is_connect() {
        TransportErrorKind::ConnectionRefused
    } else {
        TransportErrorKind::Other
    };

    TransportError::new(kind, chain)
}
