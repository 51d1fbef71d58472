//! Retry executor
//!
//! Wraps one asynchronous store operation with a per-attempt deadline,
//! linear backoff and failure classification. The control flow is an
//! explicit state machine; [`RetryPolicy::transition`] is pure so the
//! policy can be tested without timers or I/O.
//!
//! Operations produce either a value (which may itself carry a reported
//! store failure) or a [`TransportError`]:
//!
//! - success values are returned unchanged;
//! - fatal failures propagate after one attempt, unchanged;
//! - retryable failures back off `delay * attempt` and try again;
//! - once the budget is spent, a value carrying a reported failure is
//!   returned as-is, while transport errors and timeouts become
//!   [`RetryError::Exhausted`] / [`RetryError::TimedOut`].

use crate::store::{StoreFailure, StoreResponse, TransportError, TransportErrorKind};
use casebook_core::{CasebookError, RetryConfig, StoreError, TransientError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// HTTP statuses worth another attempt.
const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Postgres connection-class and availability SQLSTATEs.
const RETRYABLE_SQLSTATES: [&str; 8] = [
    "08000", "08001", "08003", "08004", "08006", "57P01", "57P03", "53300",
];

static TRANSIENT_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)failed to fetch|fetch failed|network|timeout|timed out|connection reset|econnreset|socket hang up",
    )
    .expect("Invalid transient message regex")
});

// ============================================================================
// CLASSIFICATION
// ============================================================================

/// Whether a failure is worth another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Retryable,
    Fatal,
}

/// A failed attempt, as seen by the classifier.
#[derive(Debug, Clone, Copy)]
pub enum Failure<'a> {
    /// The attempt did not settle before its deadline.
    Timeout,
    /// The round trip did not complete.
    Transport(&'a TransportError),
    /// The store answered with an error.
    Reported(&'a StoreFailure),
}

/// Classify a failure. Pure; anything not recognised as transient is fatal.
pub fn classify(failure: Failure<'_>) -> Classification {
    let retryable = match failure {
        Failure::Timeout => true,
        Failure::Transport(err) => match err.kind {
            TransportErrorKind::ConnectionReset
            | TransportErrorKind::ConnectionRefused
            | TransportErrorKind::ConnectionAborted
            | TransportErrorKind::Dns
            | TransportErrorKind::Timeout => true,
            TransportErrorKind::Request
            | TransportErrorKind::Decode
            | TransportErrorKind::Other => is_transient_message(&err.message),
        },
        Failure::Reported(reported) => {
            reported
                .status
                .is_some_and(|s| RETRYABLE_STATUSES.contains(&s))
                || reported
                    .code
                    .as_deref()
                    .is_some_and(|c| RETRYABLE_SQLSTATES.contains(&c))
                || is_transient_message(&reported.message)
        }
    };

    if retryable {
        Classification::Retryable
    } else {
        Classification::Fatal
    }
}

fn is_transient_message(message: &str) -> bool {
    TRANSIENT_MESSAGE.is_match(message)
}

// ============================================================================
// STATE MACHINE
// ============================================================================

/// Retry policy: `retries` extra attempts, linear backoff, per-attempt deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            retries: config.retries,
            delay: config.delay,
            timeout: config.timeout,
        }
    }
}

/// Where an execution stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    /// Attempt number `attempt` (1-based) is running.
    Attempting { attempt: u32 },
    /// Attempt `attempt` failed retryably; wait before the next one.
    Backoff { attempt: u32, wait: Duration },
    /// Attempt `attempts` settled without a failure.
    Succeeded { attempts: u32 },
    /// No further attempt will be made; `fatal` when the last failure was
    /// not retryable rather than the budget being spent.
    Exhausted { attempts: u32, fatal: bool },
}

impl RetryState {
    /// Attempts made so far, including the current one.
    pub fn attempts(&self) -> u32 {
        match *self {
            RetryState::Attempting { attempt } | RetryState::Backoff { attempt, .. } => attempt,
            RetryState::Succeeded { attempts } | RetryState::Exhausted { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::Exhausted { .. }
        )
    }

    /// Leave backoff for the next attempt; other states are unchanged.
    pub fn resume(self) -> RetryState {
        match self {
            RetryState::Backoff { attempt, .. } => RetryState::Attempting {
                attempt: attempt + 1,
            },
            other => other,
        }
    }
}

/// Result of one attempt, as fed to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptResult {
    Success,
    Failed(Classification),
}

impl RetryPolicy {
    /// Total attempts allowed, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Wait after failed attempt `attempt`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.delay.saturating_mul(attempt)
    }

    /// Pure transition function. Only `Attempting` consumes an attempt
    /// result; every other state is returned unchanged.
    pub fn transition(&self, state: RetryState, result: AttemptResult) -> RetryState {
        let attempt = match state {
            RetryState::Attempting { attempt } => attempt,
            other => return other,
        };

        match result {
            AttemptResult::Success => RetryState::Succeeded { attempts: attempt },
            AttemptResult::Failed(Classification::Fatal) => RetryState::Exhausted {
                attempts: attempt,
                fatal: true,
            },
            AttemptResult::Failed(Classification::Retryable) if attempt < self.max_attempts() => {
                RetryState::Backoff {
                    attempt,
                    wait: self.backoff_for(attempt),
                }
            }
            AttemptResult::Failed(Classification::Retryable) => RetryState::Exhausted {
                attempts: attempt,
                fatal: false,
            },
        }
    }
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Per-call bookkeeping; lives for one `execute` call.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub operation: String,
    pub attempt: u32,
    pub started: Instant,
    pub last_error: Option<String>,
}

impl RetryContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            attempt: 0,
            started: Instant::now(),
            last_error: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Values that may carry a failure reported by the store.
pub trait AttemptOutcome {
    fn reported_failure(&self) -> Option<&StoreFailure>;
}

impl AttemptOutcome for StoreResponse {
    fn reported_failure(&self) -> Option<&StoreFailure> {
        self.error.as_ref()
    }
}

/// Error raised by [`RetryExecutor::execute`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryError {
    /// A non-retryable transport failure, unchanged, on the given attempt.
    #[error("{error}")]
    Fatal { attempts: u32, error: TransportError },

    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: TransportError },

    #[error("timed out after {attempts} attempt(s) of {timeout:?}")]
    TimedOut { attempts: u32, timeout: Duration },
}

impl RetryError {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Fatal { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::TimedOut { attempts, .. } => *attempts,
        }
    }

    /// Map into the casebook taxonomy for the named operation.
    pub fn into_casebook_error(self, operation: &str) -> CasebookError {
        match self {
            RetryError::Fatal { error, .. } => StoreError::Transport {
                operation: operation.to_string(),
                message: error.message,
            }
            .into(),
            RetryError::Exhausted { attempts, last } => TransientError::Exhausted {
                attempts,
                message: last.message,
            }
            .into(),
            RetryError::TimedOut { attempts, timeout } => TransientError::Timeout {
                attempts,
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }
            .into(),
        }
    }
}

/// What one attempt produced.
enum Outcome<T> {
    Value(T, AttemptResult),
    Raised(TransportError, Classification),
    TimedOut,
}

impl<T> Outcome<T> {
    fn result(&self) -> AttemptResult {
        match self {
            Outcome::Value(_, result) => *result,
            Outcome::Raised(_, class) => AttemptResult::Failed(*class),
            Outcome::TimedOut => AttemptResult::Failed(Classification::Retryable),
        }
    }

    fn describe(&self) -> String
    where
        T: AttemptOutcome,
    {
        match self {
            Outcome::Value(value, _) => value
                .reported_failure()
                .map(|f| f.message.clone())
                .unwrap_or_default(),
            Outcome::Raised(err, _) => err.to_string(),
            Outcome::TimedOut => "attempt timed out".to_string(),
        }
    }

    fn settle(self, state: RetryState, policy: &RetryPolicy) -> Result<T, RetryError> {
        let attempts = state.attempts();
        let fatal = matches!(state, RetryState::Exhausted { fatal: true, .. });
        match self {
            Outcome::Value(value, _) => Ok(value),
            Outcome::Raised(error, _) if fatal => Err(RetryError::Fatal { attempts, error }),
            Outcome::Raised(last, _) => Err(RetryError::Exhausted { attempts, last }),
            Outcome::TimedOut => Err(RetryError::TimedOut {
                attempts,
                timeout: policy.timeout,
            }),
        }
    }
}

/// Executes operations under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(RetryPolicy::from(config))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget is spent.
    ///
    /// `label` names the operation in logs.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, RetryError>
    where
        T: AttemptOutcome,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut context = RetryContext::new(label);
        let mut state = RetryState::Attempting { attempt: 1 };

        loop {
            context.attempt = state.attempts();
            let outcome = match tokio::time::timeout(self.policy.timeout, operation()).await {
                Ok(Ok(value)) => {
                    let result = match value.reported_failure() {
                        Some(reported) => {
                            AttemptResult::Failed(classify(Failure::Reported(reported)))
                        }
                        None => AttemptResult::Success,
                    };
                    Outcome::Value(value, result)
                }
                Ok(Err(err)) => {
                    let class = classify(Failure::Transport(&err));
                    Outcome::Raised(err, class)
                }
                Err(_) => Outcome::TimedOut,
            };

            state = self.policy.transition(state, outcome.result());
            match state {
                RetryState::Backoff { attempt, wait } => {
                    let message = outcome.describe();
                    debug!(
                        operation = %context.operation,
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %message,
                        "Retrying after transient failure"
                    );
                    context.last_error = Some(message);
                    tokio::time::sleep(wait).await;
                    state = state.resume();
                }
                RetryState::Exhausted { attempts, fatal: false } => {
                    warn!(
                        operation = %context.operation,
                        attempts,
                        elapsed_ms = context.elapsed().as_millis() as u64,
                        error = %outcome.describe(),
                        "Retries exhausted"
                    );
                    return outcome.settle(state, &self.policy);
                }
                _ => return outcome.settle(state, &self.policy),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        }
    }

    fn reset() -> TransportError {
        TransportError::new(TransportErrorKind::ConnectionReset, "connection reset by peer")
    }

    #[test]
    fn test_classify_transport_kinds() {
        assert_eq!(classify(Failure::Transport(&reset())), Classification::Retryable);
        assert_eq!(classify(Failure::Timeout), Classification::Retryable);
        let dns = TransportError::new(TransportErrorKind::Dns, "no such host");
        assert_eq!(classify(Failure::Transport(&dns)), Classification::Retryable);
        let bad = TransportError::new(TransportErrorKind::Request, "invalid header value");
        assert_eq!(classify(Failure::Transport(&bad)), Classification::Fatal);
        let fetch = TransportError::new(TransportErrorKind::Other, "TypeError: Failed to fetch");
        assert_eq!(classify(Failure::Transport(&fetch)), Classification::Retryable);
    }

    #[test]
    fn test_classify_reported_failures() {
        let overloaded = StoreFailure::new("upstream unavailable").with_status(503);
        assert_eq!(classify(Failure::Reported(&overloaded)), Classification::Retryable);

        let admin_shutdown = StoreFailure::new("terminating connection").with_code("57P01");
        assert_eq!(classify(Failure::Reported(&admin_shutdown)), Classification::Retryable);

        let socket = StoreFailure::new("socket hang up");
        assert_eq!(classify(Failure::Reported(&socket)), Classification::Retryable);

        let duplicate = StoreFailure::new("duplicate key value violates unique constraint")
            .with_code("23505")
            .with_status(409);
        assert_eq!(classify(Failure::Reported(&duplicate)), Classification::Fatal);

        let denied = StoreFailure::new("permission denied for table cases")
            .with_code("42501")
            .with_status(403);
        assert_eq!(classify(Failure::Reported(&denied)), Classification::Fatal);
    }

    #[test]
    fn test_transition_backs_off_linearly() {
        let policy = RetryPolicy {
            retries: 2,
            delay: Duration::from_millis(300),
            timeout: Duration::from_secs(15),
        };
        let retry = AttemptResult::Failed(Classification::Retryable);

        let s1 = policy.transition(RetryState::Attempting { attempt: 1 }, retry);
        assert_eq!(
            s1,
            RetryState::Backoff {
                attempt: 1,
                wait: Duration::from_millis(300)
            }
        );
        let s2 = policy.transition(s1.resume(), retry);
        assert_eq!(
            s2,
            RetryState::Backoff {
                attempt: 2,
                wait: Duration::from_millis(600)
            }
        );
        let s3 = policy.transition(s2.resume(), retry);
        assert_eq!(
            s3,
            RetryState::Exhausted {
                attempts: 3,
                fatal: false
            }
        );
    }

    #[test]
    fn test_transition_terminal_states() {
        let policy = fast_policy(5);
        let start = RetryState::Attempting { attempt: 1 };
        assert_eq!(
            policy.transition(start, AttemptResult::Success),
            RetryState::Succeeded { attempts: 1 }
        );
        assert_eq!(
            policy.transition(start, AttemptResult::Failed(Classification::Fatal)),
            RetryState::Exhausted {
                attempts: 1,
                fatal: true
            }
        );

        let done = RetryState::Succeeded { attempts: 2 };
        assert_eq!(policy.transition(done, AttemptResult::Success), done);
        assert!(done.is_terminal());
    }

    #[test]
    fn test_zero_retries_allows_one_attempt() {
        let policy = fast_policy(0);
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(
            policy.transition(
                RetryState::Attempting { attempt: 1 },
                AttemptResult::Failed(Classification::Retryable)
            ),
            RetryState::Exhausted {
                attempts: 1,
                fatal: false
            }
        );
    }

    #[tokio::test]
    async fn test_succeeds_on_third_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy(3));

        let counter = calls.clone();
        let result = executor
            .execute("flaky", || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(reset())
                    } else {
                        Ok(StoreResponse::ok(json!({"ok": true})))
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), StoreResponse::ok(json!({"ok": true})));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_propagates_unchanged() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy(3));
        let fatal = TransportError::new(TransportErrorKind::Request, "builder error: bad url");

        let counter = calls.clone();
        let expected = fatal.clone();
        let result: Result<StoreResponse, _> = executor
            .execute("fatal", || {
                counter.fetch_add(1, Ordering::SeqCst);
                let err = expected.clone();
                async move { Err(err) }
            })
            .await;

        assert_eq!(
            result.unwrap_err(),
            RetryError::Fatal {
                attempts: 1,
                error: fatal
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fatal_after_retries_reports_its_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy(3));

        let counter = calls.clone();
        let result: Result<StoreResponse, _> = executor
            .execute("flaky then fatal", || {
                let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(reset())
                    } else {
                        Err(TransportError::new(
                            TransportErrorKind::Request,
                            "builder error: bad url",
                        ))
                    }
                }
            })
            .await;

        let err = result.unwrap_err();
        assert!(matches!(err, RetryError::Fatal { .. }));
        assert_eq!(err.attempts(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_never_settling_operation_times_out() {
        let executor = RetryExecutor::new(RetryPolicy {
            retries: 1,
            delay: Duration::from_millis(1),
            timeout: Duration::from_millis(5),
        });

        let result: Result<StoreResponse, _> = executor
            .execute("hang", || std::future::pending::<Result<StoreResponse, TransportError>>())
            .await;

        match result {
            Err(RetryError::TimedOut { attempts, timeout }) => {
                assert_eq!(attempts, 2);
                assert_eq!(timeout, Duration::from_millis(5));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exhausted_reported_failure_is_returned() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy(2));

        let counter = calls.clone();
        let response = executor
            .execute("overloaded", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Ok::<_, TransportError>(StoreResponse::failed(
                        StoreFailure::new("too many connections").with_code("53300"),
                    ))
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(
            response.error.map(|e| e.message),
            Some("too many connections".to_string())
        );
    }

    #[tokio::test]
    async fn test_fatal_reported_failure_returned_after_one_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_policy(2));

        let counter = calls.clone();
        let response = executor
            .execute("constraint", || {
                counter.fetch_add(1, Ordering::SeqCst);
                async {
                    Ok::<_, TransportError>(StoreResponse::failed(
                        StoreFailure::new("null value in column").with_code("23502"),
                    ))
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(response.is_error());
    }

    #[tokio::test]
    async fn test_exhausted_transport_error_carries_attempts() {
        let executor = RetryExecutor::new(fast_policy(1));
        let result: Result<StoreResponse, _> =
            executor.execute("down", || async { Err(reset()) }).await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 2);
        let mapped = err.into_casebook_error("Listar casos");
        assert!(mapped.is_transient());
    }
}
