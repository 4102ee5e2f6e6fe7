//! Circuit breaker configuration.

use crate::core::{ConfigError, ErrorKind};
use std::time::Duration;

/// Configuration for one dependency's circuit breaker.
///
/// Fixed at first registration; see
/// [`CircuitBreakerRegistry::get_or_create`](crate::circuit_breaker::CircuitBreakerRegistry::get_or_create).
#[derive(Debug, Clone, PartialEq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker open.
    pub failure_threshold: u32,

    /// Minimum time spent open before a probe is allowed.
    pub open_duration: Duration,

    /// Maximum number of concurrent probes while half-open.
    pub half_open_max_probes: u32,

    /// Which failures count against the breaker.
    pub failure_policy: FailurePolicy,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
            half_open_max_probes: 1,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl BreakerConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets the open duration.
    pub fn with_open_duration(mut self, duration: Duration) -> Self {
        self.open_duration = duration;
        self
    }

    /// Sets the maximum number of half-open probes.
    pub fn with_half_open_max_probes(mut self, max: u32) -> Self {
        self.half_open_max_probes = max.max(1);
        self
    }

    /// Sets the failure policy.
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// A configuration for critical dependencies such as payment
    /// processors and banking rails.
    ///
    /// - Trips after 3 failures
    /// - Stays open for 60 seconds
    /// - One probe at a time
    pub fn critical() -> Self {
        Self {
            failure_threshold: 3,
            open_duration: Duration::from_secs(60),
            half_open_max_probes: 1,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// A configuration favouring availability.
    ///
    /// - Trips after 10 failures
    /// - Stays open for 10 seconds
    /// - Allows 3 probes
    pub fn high_availability() -> Self {
        Self {
            failure_threshold: 10,
            open_duration: Duration::from_secs(10),
            half_open_max_probes: 3,
            failure_policy: FailurePolicy::default(),
        }
    }

    /// Checks the configuration for values the state machine can't honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Zero {
                field: "failure_threshold",
            });
        }
        if self.half_open_max_probes == 0 {
            return Err(ConfigError::Zero {
                field: "half_open_max_probes",
            });
        }
        Ok(())
    }
}

/// Defines which failed calls count against the breaker.
///
/// Exhausted retries and cancellations always count: either way the
/// dependency did not answer usefully in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Count non-retryable errors (4xx-equivalents) as failures.
    ///
    /// Off by default: a permanent error means the dependency answered.
    pub count_non_retryable: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            count_non_retryable: false,
        }
    }
}

impl FailurePolicy {
    /// Creates a new failure policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that counts every failed call.
    pub fn all_errors() -> Self {
        Self {
            count_non_retryable: true,
        }
    }

    /// Determines if a failed call of the given kind counts as a failure.
    pub fn should_count(&self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::CircuitOpen => false,
            ErrorKind::NonRetryable => self.count_non_retryable,
            ErrorKind::RetryExhausted | ErrorKind::Cancelled => true,
        }
    }
}
