//! Circuit breaker implementation.

use crate::circuit_breaker::config::BreakerConfig;
use crate::circuit_breaker::state::{BreakerMetrics, BreakerSnapshot, BreakerState, CircuitState};
use crate::core::clock::{elapsed_between, ArcClock, SystemClock};

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// The circuit breaker for one named dependency.
///
/// All state lives behind a single mutex, so admission, outcome recording
/// and resets for one dependency are totally ordered while unrelated
/// dependencies never contend.
///
/// # States
///
/// - **Closed**: Calls pass through; consecutive failures are counted.
/// - **Open**: Calls are rejected until `open_duration` has elapsed.
/// - **Half-Open**: Up to `half_open_max_probes` trial calls test the
///   dependency. The first probe outcome closes or reopens the circuit.
///
/// # Example
///
/// ```rust
/// use railguard::circuit_breaker::{BreakerConfig, CircuitBreaker, Outcome};
/// use std::sync::Arc;
///
/// let breaker = Arc::new(CircuitBreaker::new("stripe", BreakerConfig::default()));
///
/// if let Ok(permit) = breaker.try_acquire() {
///     // ... call the dependency ...
///     permit.record(Outcome::Success);
/// }
/// ```
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    clock: ArcClock,
    state: Mutex<BreakerState>,
}

/// The result of a call, as the breaker sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The dependency answered.
    Success,
    /// The dependency failed or did not answer in time.
    Failure,
    /// The caller gave up before the dependency was called. Frees a probe
    /// slot without counting as either success or failure.
    Abandoned,
}

/// Whether a permit was issued for a normal call or a half-open probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermitKind {
    /// Admitted while closed.
    Normal,
    /// Admitted as a half-open trial call.
    Probe,
}

/// An admission rejected by the breaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The state that caused the rejection.
    pub state: CircuitState,
    /// Time left in the open window, if the breaker is open.
    pub retry_after: Option<Duration>,
}

impl CircuitBreaker {
    /// Creates a breaker that reads the system clock.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Creates a breaker with the given time source.
    pub fn with_clock(name: impl Into<String>, config: BreakerConfig, clock: ArcClock) -> Self {
        let now = clock.now();
        Self {
            name: name.into(),
            config,
            clock,
            state: Mutex::new(BreakerState::new(now)),
        }
    }

    /// Returns the dependency name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state.
    ///
    /// This never transitions the breaker: an open breaker whose window
    /// has elapsed still reads as open until the next admission check.
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.lock().metrics.clone()
    }

    /// Returns a point-in-time copy of the breaker.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.lock();
        BreakerSnapshot {
            name: self.name.clone(),
            state: state.state,
            consecutive_failures: state.consecutive_failures,
            last_failure_at: state.last_failure_at,
            last_transition_at: state.last_transition_at,
            active_probes: state.active_probes,
            failure_threshold: self.config.failure_threshold,
            open_duration_ms: u64::try_from(self.config.open_duration.as_millis())
                .unwrap_or(u64::MAX),
            metrics: state.metrics.clone(),
        }
    }

    /// Asks for permission to make one call.
    ///
    /// An open breaker whose window has elapsed moves to half-open here and
    /// hands out a probe permit. The returned [`Permit`] must be settled
    /// with [`Permit::record`]; dropping it unrecorded counts as a failure.
    pub fn try_acquire(self: &Arc<Self>) -> Result<Permit, Rejection> {
        let now = self.clock.now();
        let mut state = self.lock();

        let kind = match state.state {
            CircuitState::Closed => PermitKind::Normal,

            CircuitState::Open => {
                let elapsed = elapsed_between(state.last_transition_at, now);
                if elapsed < self.config.open_duration {
                    state.metrics.record_rejected();
                    tracing::debug!(
                        dependency = %self.name,
                        remaining_ms = (self.config.open_duration - elapsed).as_millis() as u64,
                        "Circuit open, call rejected"
                    );
                    return Err(Rejection {
                        state: CircuitState::Open,
                        retry_after: Some(self.config.open_duration - elapsed),
                    });
                }

                let from = state.transition(CircuitState::HalfOpen, now);
                self.log_transition(from, CircuitState::HalfOpen);
                state.active_probes = 1;
                PermitKind::Probe
            }

            CircuitState::HalfOpen => {
                if state.active_probes >= self.config.half_open_max_probes {
                    state.metrics.record_rejected();
                    tracing::debug!(
                        dependency = %self.name,
                        active_probes = state.active_probes,
                        "Maximum probes in flight, call rejected"
                    );
                    return Err(Rejection {
                        state: CircuitState::HalfOpen,
                        retry_after: None,
                    });
                }
                state.active_probes += 1;
                PermitKind::Probe
            }
        };

        Ok(Permit {
            breaker: Arc::clone(self),
            kind,
            generation: state.generation,
            settled: false,
        })
    }

    /// Forces the breaker back to closed with zeroed counters.
    ///
    /// In-flight permits become stale and can no longer drive transitions.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        let from = state.state;
        let generation = state.generation + 1;
        *state = BreakerState::new(now);
        state.generation = generation;
        drop(state);

        tracing::info!(
            dependency = %self.name,
            from = %from,
            "Circuit breaker reset"
        );
    }

    /// Forces the breaker open, restarting the open window.
    pub fn force_open(&self) {
        let now = self.clock.now();
        let mut state = self.lock();
        let from = state.transition(CircuitState::Open, now);
        drop(state);
        self.log_transition(from, CircuitState::Open);
    }

    fn apply(&self, kind: PermitKind, generation: u64, outcome: Outcome) -> CircuitState {
        let now = self.clock.now();
        let mut state = self.lock();

        match outcome {
            Outcome::Success => state.metrics.record_success(),
            Outcome::Failure => {
                state.metrics.record_failure();
                state.last_failure_at = Some(now);
            }
            Outcome::Abandoned => {
                if generation == state.generation && kind == PermitKind::Probe {
                    state.active_probes = state.active_probes.saturating_sub(1);
                }
                return state.state;
            }
        }

        if generation != state.generation {
            tracing::trace!(
                dependency = %self.name,
                ?outcome,
                "Stale permit outcome ignored by state machine"
            );
            return state.state;
        }

        match (state.state, kind, outcome) {
            (CircuitState::Closed, PermitKind::Normal, Outcome::Success) => {
                state.consecutive_failures = 0;
            }

            (CircuitState::Closed, PermitKind::Normal, Outcome::Failure) => {
                state.consecutive_failures += 1;
                if state.consecutive_failures >= self.config.failure_threshold {
                    let from = state.transition(CircuitState::Open, now);
                    self.log_transition(from, CircuitState::Open);
                }
            }

            (CircuitState::HalfOpen, PermitKind::Probe, Outcome::Success) => {
                let from = state.transition(CircuitState::Closed, now);
                self.log_transition(from, CircuitState::Closed);
            }

            (CircuitState::HalfOpen, PermitKind::Probe, Outcome::Failure) => {
                state.consecutive_failures = 0;
                let from = state.transition(CircuitState::Open, now);
                self.log_transition(from, CircuitState::Open);
            }

            // A matching generation pins the state the permit was issued in.
            _ => {}
        }

        state.state
    }

    fn log_transition(&self, from: CircuitState, to: CircuitState) {
        tracing::info!(
            dependency = %self.name,
            from = %from,
            to = %to,
            "Circuit breaker state changed"
        );
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &*self.lock())
            .field("config", &self.config)
            .finish()
    }
}

/// Permission to make one call through a breaker.
///
/// Settle it with [`Permit::record`]. A permit dropped without being
/// recorded (for example because the caller's future was dropped) records
/// a failure, so a half-open probe slot is never leaked.
#[must_use = "a permit must be recorded; dropping it counts as a failure"]
pub struct Permit {
    breaker: Arc<CircuitBreaker>,
    kind: PermitKind,
    generation: u64,
    settled: bool,
}

impl Permit {
    /// Returns whether this is a normal call or a probe.
    pub fn kind(&self) -> PermitKind {
        self.kind
    }

    /// Returns `true` if this permit is a half-open probe.
    pub fn is_probe(&self) -> bool {
        self.kind == PermitKind::Probe
    }

    /// Returns the dependency name.
    pub fn dependency(&self) -> &str {
        &self.breaker.name
    }

    /// Records the call's outcome and returns the breaker's resulting state.
    ///
    /// A permit issued before the breaker last changed state (or was reset)
    /// only updates metrics; it can't move the state machine.
    pub fn record(mut self, outcome: Outcome) -> CircuitState {
        self.settled = true;
        self.breaker.apply(self.kind, self.generation, outcome)
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(
                dependency = %self.breaker.name,
                kind = ?self.kind,
                "Permit dropped without an outcome, recording failure"
            );
            self.breaker.apply(self.kind, self.generation, Outcome::Failure);
        }
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("dependency", &self.breaker.name)
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .finish()
    }
}
