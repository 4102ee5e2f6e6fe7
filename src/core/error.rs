//! Error types for the railguard library.
//!
//! Every failed [`IntegrationGateway`](crate::gateway::IntegrationGateway)
//! call ends in exactly one [`GatewayError`] variant. The library never
//! recovers an error on the caller's behalf and never panics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The error returned by a guarded call.
///
/// `E` is the error type produced by the caller's unit of work.
#[derive(Debug, Error)]
pub enum GatewayError<E> {
    /// Admission was rejected; no work was attempted.
    #[error("circuit breaker open for dependency '{dependency}'")]
    CircuitOpen {
        /// Name of the dependency whose breaker is open.
        dependency: String,
        /// Time left before the breaker allows a probe, if known.
        retry_after: Option<Duration>,
    },

    /// The work failed with an error classified as permanent.
    #[error("dependency '{dependency}' failed with a non-retryable error: {source}")]
    NonRetryable {
        /// Name of the dependency.
        dependency: String,
        /// The original error.
        #[source]
        source: E,
    },

    /// All retry attempts were consumed.
    #[error("dependency '{dependency}' failed after {attempts} attempt(s) in {elapsed:?}: {source}")]
    RetryExhausted {
        /// Name of the dependency.
        dependency: String,
        /// Number of attempts made.
        attempts: u32,
        /// Total time spent, including backoff.
        elapsed: Duration,
        /// The error from the last attempt.
        #[source]
        source: E,
    },

    /// The caller's deadline or cancellation token fired mid-call.
    #[error("call to dependency '{dependency}' cancelled after {attempts} attempt(s) in {elapsed:?}")]
    Cancelled {
        /// Name of the dependency.
        dependency: String,
        /// Number of attempts started.
        attempts: u32,
        /// Time spent before cancellation.
        elapsed: Duration,
        /// The error from the last completed attempt, if any.
        last_error: Option<E>,
    },
}

impl<E> GatewayError<E> {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::NonRetryable { .. } => ErrorKind::NonRetryable,
            Self::RetryExhausted { .. } => ErrorKind::RetryExhausted,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }

    /// Returns the dependency this error belongs to.
    pub fn dependency(&self) -> &str {
        match self {
            Self::CircuitOpen { dependency, .. }
            | Self::NonRetryable { dependency, .. }
            | Self::RetryExhausted { dependency, .. }
            | Self::Cancelled { dependency, .. } => dependency,
        }
    }

    /// Returns `true` if this error should surface as "service temporarily
    /// unavailable" behind a request-serving boundary.
    ///
    /// `NonRetryable` is excluded: it means the request itself was bad.
    pub fn is_service_unavailable(&self) -> bool {
        !matches!(self, Self::NonRetryable { .. })
    }

    /// Returns the underlying work error, if one was captured.
    pub fn upstream_error(&self) -> Option<&E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::NonRetryable { source, .. } | Self::RetryExhausted { source, .. } => Some(source),
            Self::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    /// Consumes the error and returns the underlying work error, if any.
    pub fn into_upstream_error(self) -> Option<E> {
        match self {
            Self::CircuitOpen { .. } => None,
            Self::NonRetryable { source, .. } | Self::RetryExhausted { source, .. } => Some(source),
            Self::Cancelled { last_error, .. } => last_error,
        }
    }
}

/// The kind of a [`GatewayError`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Admission rejected by an open breaker.
    CircuitOpen,
    /// Permanent failure, retry loop aborted.
    NonRetryable,
    /// All attempts consumed.
    RetryExhausted,
    /// Deadline or cancellation fired.
    Cancelled,
}

impl ErrorKind {
    /// Returns the name of the kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CircuitOpen => "circuit_open",
            Self::NonRetryable => "non_retryable",
            Self::RetryExhausted => "retry_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A general-purpose error for outbound calls.
///
/// Callers with their own error type can implement
/// [`Classify`](crate::core::Classify) for it instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The dependency did not answer in time.
    #[error("request to '{target}' timed out after {elapsed:?}")]
    Timeout {
        /// The remote endpoint or service.
        target: String,
        /// How long the request ran.
        elapsed: Duration,
    },

    /// The connection could not be established or was reset.
    #[error("connection to '{target}' failed: {message}")]
    ConnectionFailed {
        /// The remote endpoint or service.
        target: String,
        /// Error message describing the failure.
        message: String,
    },

    /// The dependency answered with a server-side error (5xx-equivalent).
    #[error("'{target}' is unavailable (status {status})")]
    ServiceUnavailable {
        /// The remote endpoint or service.
        target: String,
        /// Status code returned.
        status: u16,
    },

    /// The dependency is throttling us.
    #[error("rate limited by '{target}'; retry after {retry_after:?}")]
    RateLimited {
        /// The remote endpoint or service.
        target: String,
        /// Suggested wait time, if provided.
        retry_after: Option<Duration>,
    },

    /// The dependency rejected the request itself (4xx-equivalent).
    #[error("'{target}' rejected the request (status {status}): {reason}")]
    InvalidRequest {
        /// The remote endpoint or service.
        target: String,
        /// Status code returned.
        status: u16,
        /// Reason given by the dependency.
        reason: String,
    },

    /// Credentials were refused.
    #[error("authentication with '{target}' failed: {reason}")]
    AuthenticationFailed {
        /// The remote endpoint or service.
        target: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Any other failure.
    #[error("{message}")]
    Other {
        /// Description of the failure.
        message: String,
    },
}

impl UpstreamError {
    /// Creates a `Timeout` error.
    pub fn timeout(target: impl Into<String>, elapsed: Duration) -> Self {
        Self::Timeout {
            target: target.into(),
            elapsed,
        }
    }

    /// Creates a `ConnectionFailed` error.
    pub fn connection_failed(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Creates a `ServiceUnavailable` error.
    pub fn service_unavailable(target: impl Into<String>, status: u16) -> Self {
        Self::ServiceUnavailable {
            target: target.into(),
            status,
        }
    }

    /// Creates an `InvalidRequest` error.
    pub fn invalid_request(
        target: impl Into<String>,
        status: u16,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRequest {
            target: target.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Creates an `Other` error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Maps an HTTP-style status code to an error.
    ///
    /// 429 becomes `RateLimited`, 401/403 `AuthenticationFailed`, other 4xx
    /// `InvalidRequest`, and everything else `ServiceUnavailable`.
    pub fn from_status(target: impl Into<String>, status: u16, reason: impl Into<String>) -> Self {
        let target = target.into();
        match status {
            429 => Self::RateLimited {
                target,
                retry_after: None,
            },
            401 | 403 => Self::AuthenticationFailed {
                target,
                reason: reason.into(),
            },
            400..=499 => Self::InvalidRequest {
                target,
                status,
                reason: reason.into(),
            },
            _ => Self::ServiceUnavailable { target, status },
        }
    }
}

/// Invalid breaker, retry, or gateway configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// A value that must be at least one was zero.
    #[error("'{field}' must be at least 1")]
    Zero {
        /// The offending field.
        field: &'static str,
    },

    /// A value fell outside its allowed range.
    #[error("'{field}' is out of range: {reason}")]
    OutOfRange {
        /// The offending field.
        field: &'static str,
        /// Description of the allowed range.
        reason: String,
    },

    /// A configuration document could not be parsed.
    #[error("invalid configuration document: {message}")]
    Parse {
        /// Parser message.
        message: String,
    },

    /// A named dependency profile is invalid.
    #[error("invalid profile for dependency '{dependency}': {source}")]
    Profile {
        /// Name of the dependency.
        dependency: String,
        /// What is wrong with it.
        #[source]
        source: Box<ConfigError>,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
        }
    }
}

/// A specialized `Result` type for guarded calls.
pub type GatewayResult<T, E> = Result<T, GatewayError<E>>;
