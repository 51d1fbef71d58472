//! Error types for casebook operations
//!
//! The taxonomy mirrors how failures are handled: validation errors are
//! raised before any I/O, transient errors only surface once the retry
//! budget is spent, and store errors keep the store's message verbatim.
//! Tenant mismatches are never errors; they are resolved by suppression.

use thiserror::Error;

/// Caller-supplied input violates a precondition.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A mandatory field is absent; `message` is the user-facing text.
    #[error("{message}")]
    MissingField { field: String, message: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ValidationError {
    /// Missing-field error with a user-facing message.
    pub fn missing(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError::MissingField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field, .. } => field,
            ValidationError::InvalidValue { field, .. } => field,
        }
    }
}

/// Network, timeout or connection failure that outlived its retry budget.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransientError {
    #[error("Operation timed out after {attempts} attempt(s) of {timeout_ms}ms")]
    Timeout { attempts: u32, timeout_ms: u64 },

    #[error("Transport failure after {attempts} attempt(s): {message}")]
    Exhausted { attempts: u32, message: String },
}

impl TransientError {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            TransientError::Timeout { attempts, .. } => *attempts,
            TransientError::Exhausted { attempts, .. } => *attempts,
        }
    }
}

/// The store executed the request but reported a failure.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Failure reported by the store; `message` is preserved verbatim.
    #[error("{operation} failed: {message}")]
    Reported {
        operation: String,
        code: Option<String>,
        message: String,
    },

    /// Non-retryable transport failure (malformed request, TLS, ...).
    #[error("{operation} could not reach the store: {message}")]
    Transport { operation: String, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A mutation returned no row.
    #[error("{operation} returned no data")]
    EmptyResult { operation: String },
}

impl StoreError {
    /// The underlying store message, when there is one.
    pub fn store_message(&self) -> Option<&str> {
        match self {
            StoreError::Reported { message, .. } | StoreError::Transport { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse classification used for logging and caller dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Transient,
    Store,
    Config,
    Decode,
}

/// Master error type for all casebook errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CasebookError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("Transient error: {0}")]
    Transient(#[from] TransientError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not decode {entity} row: {reason}")]
    Decode { entity: String, reason: String },
}

impl CasebookError {
    /// Build a decode error.
    pub fn decode(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        CasebookError::Decode {
            entity: entity.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CasebookError::Validation(_) => ErrorKind::Validation,
            CasebookError::Transient(_) => ErrorKind::Transient,
            CasebookError::Store(_) => ErrorKind::Store,
            CasebookError::Config(_) => ErrorKind::Config,
            CasebookError::Decode { .. } => ErrorKind::Decode,
        }
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}

/// Result type alias for casebook operations.
pub type CasebookResult<T> = Result<T, CasebookError>;

// =============================================================================
// TESTS
// =============================================================================
