//! Circuit breaker state machine data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted.
    #[default]
    Closed,
    /// Calls are rejected until the open window elapses.
    Open,
    /// A limited number of probe calls test whether the dependency recovered.
    HalfOpen,
}

impl CircuitState {
    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        matches!(self, Self::HalfOpen)
    }

    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The mutable record behind one breaker. Only ever touched under the
/// breaker's mutex.
#[derive(Debug, Clone)]
pub(crate) struct BreakerState {
    pub(crate) state: CircuitState,
    pub(crate) consecutive_failures: u32,
    pub(crate) last_failure_at: Option<DateTime<Utc>>,
    pub(crate) last_transition_at: DateTime<Utc>,
    pub(crate) active_probes: u32,
    /// Bumped on every state change and reset; permits from an older
    /// generation no longer drive transitions.
    pub(crate) generation: u64,
    pub(crate) metrics: BreakerMetrics,
}

impl BreakerState {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            last_transition_at: now,
            active_probes: 0,
            generation: 0,
            metrics: BreakerMetrics::new(),
        }
    }

    /// Moves to `to`, returning the previous state.
    pub(crate) fn transition(&mut self, to: CircuitState, now: DateTime<Utc>) -> CircuitState {
        let from = self.state;
        self.state = to;
        self.last_transition_at = now;
        self.active_probes = 0;
        self.generation += 1;

        match to {
            CircuitState::Open => self.metrics.record_opened(),
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.metrics.record_closed();
            }
            CircuitState::HalfOpen => {}
        }

        from
    }
}

/// A point-in-time copy of one breaker.
///
/// Snapshots are values, never references, so a reader can't observe a
/// half-applied transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    /// Dependency name.
    pub name: String,
    /// Current state.
    pub state: CircuitState,
    /// Consecutive failures counted while closed.
    pub consecutive_failures: u32,
    /// When the last failure was recorded.
    pub last_failure_at: Option<DateTime<Utc>>,
    /// When the breaker last changed state.
    pub last_transition_at: DateTime<Utc>,
    /// Probe calls currently in flight.
    pub active_probes: u32,
    /// Failures required to trip.
    pub failure_threshold: u32,
    /// Minimum time spent open before a probe, in milliseconds.
    pub open_duration_ms: u64,
    /// Lifetime counters.
    pub metrics: BreakerMetrics,
}

/// Metrics about circuit breaker behavior.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Total number of admission requests.
    pub total_requests: u64,
    /// Number of successful calls.
    pub successful_requests: u64,
    /// Number of failed calls.
    pub failed_requests: u64,
    /// Number of calls rejected by admission control.
    pub rejected_requests: u64,
    /// Number of times the circuit has opened.
    pub times_opened: u64,
    /// Number of times the circuit has closed again.
    pub times_closed: u64,
}

impl BreakerMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a successful call.
    pub fn record_success(&mut self) {
        self.total_requests += 1;
        self.successful_requests += 1;
    }

    /// Records a failed call.
    pub fn record_failure(&mut self) {
        self.total_requests += 1;
        self.failed_requests += 1;
    }

    /// Records a rejected call.
    pub fn record_rejected(&mut self) {
        self.total_requests += 1;
        self.rejected_requests += 1;
    }

    /// Records that the circuit opened.
    pub fn record_opened(&mut self) {
        self.times_opened += 1;
    }

    /// Records that the circuit closed.
    pub fn record_closed(&mut self) {
        self.times_closed += 1;
    }

    /// Returns the success rate of executed calls (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        let executed = self.successful_requests + self.failed_requests;
        if executed == 0 {
            return 1.0;
        }
        self.successful_requests as f64 / executed as f64
    }

    /// Returns the failure rate of executed calls (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        let executed = self.successful_requests + self.failed_requests;
        if executed == 0 {
            return 0.0;
        }
        self.failed_requests as f64 / executed as f64
    }
}
