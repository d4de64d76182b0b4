//! Error types surfaced by the hedging engine.
//!
//! Per-attempt causes (`AttemptError`) are kept separate from the outer,
//! caller-visible failure (`HedgingError`), since a single attempt's
//! transport error is not always the shape the caller should see — the
//! engine may recover from it via a hedge.

use std::time::Duration;

use thiserror::Error;

/// The cause of a single attempt's failure.
///
/// Corresponds to the "AttemptFailure" / "Timeout" / "UnprocessedRequest" /
/// "ResponseCancelled" rows of the error-kind table.
#[derive(Debug, Error, Clone)]
pub enum AttemptError {
    /// The request failed before it reached the wire (connection refused,
    /// DNS failure, TLS handshake failure, ...). Safe to hedge or retry.
    #[error("request was not processed by the endpoint: {0}")]
    Unprocessed(String),

    /// The endpoint accepted the request but returned a transport/protocol
    /// level error after processing it.
    #[error("transport error: {0}")]
    Protocol(String),

    /// The per-attempt timeout, or the whole-operation deadline, elapsed
    /// before this attempt completed.
    #[error("attempt timed out")]
    Timeout,

    /// This attempt lost the race and was cancelled; its response (if any)
    /// is never surfaced to the caller.
    #[error("attempt cancelled")]
    Cancelled,
}

impl AttemptError {
    /// True for failures that occurred before the request reached the wire —
    /// the shape `onUnprocessed` rule filters match against.
    pub fn is_unprocessed(&self) -> bool {
        matches!(self, AttemptError::Unprocessed(_))
    }

    /// True for timeouts — the shape `onTimeoutException` rule filters match
    /// against.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptError::Timeout)
    }
}

/// Failure building a [`crate::config::HedgingConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("maxTotalAttempts must be > 0, got {0}")]
    InvalidMaxTotalAttempts(usize),

    #[error("perAttemptResponseTimeoutMs must be >= 0, got {0}")]
    InvalidPerAttemptTimeout(i64),

    #[error("initialHedgingDelayMs must be >= 0, got {0}")]
    InvalidInitialDelay(i64),

    #[error("maxContentLength must be > 0 for a content-aware rule, got {0}")]
    InvalidMaxContentLength(usize),

    #[error("maxContentLength is only meaningful with a content-aware rule")]
    MaxContentLengthWithoutContentRule,
}

/// Failure surfaced to the caller of [`crate::engine::HedgingClient::execute`].
#[derive(Debug, Error, Clone)]
pub enum HedgingError {
    /// Every attempt either failed and no rule recovered it, or the cap/deadline
    /// was exhausted while hedging. Carries the last attempt's cause.
    #[error("hedging exhausted: {0}")]
    AllAttemptsFailed(#[from] AttemptError),

    /// The whole-operation deadline elapsed before any attempt produced an
    /// acceptable outcome.
    #[error("hedged call timed out after {0:?}")]
    DeadlineExceeded(Duration),

    /// The `HedgingConfigMapping`'s factory failed to build a config for this
    /// request's key.
    #[error("hedging config factory failed: {0}")]
    ConfigFactoryFailed(#[from] ConfigError),
}
