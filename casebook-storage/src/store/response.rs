//! Store responses and transport failures

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure reported by the store in the body of an otherwise completed
/// round trip (constraint violation, permission denial, overload, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreFailure {
    /// SQLSTATE or store-specific error code
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
    /// HTTP status of the response, when it came over HTTP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl StoreFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
            hint: None,
            status: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}

/// Result of a completed round trip: `{data, error, count}`.
///
/// A response may carry an error; callers inspect it rather than relying on
/// a raised error, which is how retry exhaustion of a reported failure is
/// surfaced.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoreResponse {
    pub data: Value,
    pub error: Option<StoreFailure>,
    /// Exact row count, when requested
    pub count: Option<u64>,
}

impl StoreResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            error: None,
            count: None,
        }
    }

    pub fn failed(error: StoreFailure) -> Self {
        Self {
            data: Value::Null,
            error: Some(error),
            count: None,
        }
    }

    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Data as a list of rows: arrays as-is, a lone object as one row,
    /// null as none.
    pub fn rows(&self) -> Vec<Value> {
        match &self.data {
            Value::Array(rows) => rows.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        }
    }

    /// First row, if any.
    pub fn first_row(&self) -> Option<Value> {
        match &self.data {
            Value::Array(rows) => rows.first().cloned(),
            Value::Null => None,
            other => Some(other.clone()),
        }
    }
}

/// How a round trip failed before the store could answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    ConnectionReset,
    ConnectionRefused,
    ConnectionAborted,
    Dns,
    Timeout,
    /// The request could not be built or was rejected locally
    Request,
    /// The response body could not be decoded
    Decode,
    Other,
}

/// The round trip did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
