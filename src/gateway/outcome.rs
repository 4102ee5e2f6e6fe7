//! The result of one guarded call.

use crate::circuit_breaker::CircuitState;
use crate::core::{ErrorKind, GatewayError, GatewayResult};

use std::time::Duration;
use uuid::Uuid;

/// Everything the caller needs to log or audit a guarded call.
#[derive(Debug)]
pub struct CallOutcome<T, E> {
    /// Unique identifier for this call.
    pub call_id: Uuid,
    /// The dependency that was called.
    pub dependency: String,
    /// The work's value, or why there is none.
    pub result: GatewayResult<T, E>,
    /// Attempts started; zero when admission was rejected.
    pub attempts: u32,
    /// Total time spent, including backoff.
    pub elapsed: Duration,
    /// The breaker state after the outcome was recorded.
    pub breaker_state: CircuitState,
}

impl<T, E> CallOutcome<T, E> {
    /// Returns `true` if the work produced a value.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Returns the value, if any.
    pub fn value(&self) -> Option<&T> {
        self.result.as_ref().ok()
    }

    /// Returns the error, if any.
    pub fn error(&self) -> Option<&GatewayError<E>> {
        self.result.as_ref().err()
    }

    /// Returns the kind of error, if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error().map(GatewayError::kind)
    }

    /// Discards the call metadata and returns the plain result.
    pub fn into_result(self) -> GatewayResult<T, E> {
        self.result
    }
}
