//! Deadlines and cancellation for guarded calls.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call options for [`IntegrationGateway::invoke_with`](crate::gateway::IntegrationGateway::invoke_with).
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overall time budget for the call, including retries and backoff.
    pub deadline: Option<Duration>,

    /// A caller-owned token; cancelling it stops the call.
    pub cancellation: Option<CancellationToken>,
}

impl CallOptions {
    /// Creates options with no deadline and no cancellation token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the overall deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Sets the caller's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// The cancellation scope of one call.
///
/// Holds a child of the caller's token (cancelling the scope never cancels
/// the caller) and an optional absolute deadline. The token is handed to
/// every attempt so work can observe cancellation.
#[derive(Debug, Clone)]
pub struct CancelScope {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// Creates a scope from a parent token and a deadline relative to now.
    pub fn new(parent: Option<&CancellationToken>, deadline: Option<Duration>) -> Self {
        let token = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        Self {
            token,
            deadline: deadline.map(|d| Instant::now() + d),
        }
    }

    /// A scope that never fires on its own.
    pub fn unbounded() -> Self {
        Self::new(None, None)
    }

    /// Returns the token handed to work.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the absolute deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns `true` if the token was cancelled or the deadline passed.
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Cancels the scope's token, signalling in-flight work.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Completes when the token is cancelled or the deadline passes.
    pub async fn fired(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}
