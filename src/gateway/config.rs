//! Per-dependency configuration.

use crate::circuit_breaker::{BreakerConfig, FailurePolicy};
use crate::core::ConfigError;
use crate::gateway::retry::RetryPolicy;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Breaker and retry settings for one dependency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyProfile {
    /// Circuit breaker settings, fixed when the breaker is first created.
    pub breaker: BreakerConfig,
    /// Retry settings.
    pub retry: RetryPolicy,
}

impl DependencyProfile {
    /// Creates a profile with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the breaker configuration.
    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// A profile for payment processors and banking rails.
    pub fn critical() -> Self {
        Self {
            breaker: BreakerConfig::critical(),
            retry: RetryPolicy::default(),
        }
    }

    /// Validates both halves of the profile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.breaker.validate()?;
        self.retry.validate()
    }
}

/// A gateway configuration document.
///
/// Every field is optional; dependency entries override the defaults
/// field by field. Durations are in milliseconds.
///
/// ```rust
/// use railguard::gateway::GatewayConfig;
///
/// let config = GatewayConfig::from_json_str(r#"{
///     "default_deadline_ms": 10000,
///     "defaults": { "max_attempts": 3 },
///     "dependencies": {
///         "stripe": { "failure_threshold": 3, "open_duration_ms": 60000 }
///     }
/// }"#).unwrap();
///
/// let stripe = config.profile("stripe");
/// assert_eq!(stripe.breaker.failure_threshold, 3);
/// assert_eq!(stripe.retry.max_attempts, 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Overall deadline applied to calls that don't set their own.
    pub default_deadline_ms: Option<u64>,
    /// Settings applied to every dependency.
    pub defaults: ProfileOverrides,
    /// Per-dependency overrides, keyed by dependency name.
    pub dependencies: BTreeMap<String, ProfileOverrides>,
}

impl GatewayConfig {
    /// Parses a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Returns the default profile.
    pub fn default_profile(&self) -> DependencyProfile {
        self.defaults.apply(DependencyProfile::default())
    }

    /// Returns the resolved profile for a dependency.
    pub fn profile(&self, dependency: &str) -> DependencyProfile {
        let base = self.default_profile();
        match self.dependencies.get(dependency) {
            Some(overrides) => overrides.apply(base),
            None => base,
        }
    }

    /// Returns every named profile, resolved against the defaults.
    pub fn profiles(&self) -> Vec<(String, DependencyProfile)> {
        self.dependencies
            .keys()
            .map(|name| (name.clone(), self.profile(name)))
            .collect()
    }

    /// Returns the default deadline.
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline_ms.map(Duration::from_millis)
    }

    /// Validates the defaults and every resolved dependency profile.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.default_profile().validate()?;
        for (name, profile) in self.profiles() {
            profile.validate().map_err(|err| ConfigError::Profile {
                dependency: name,
                source: Box::new(err),
            })?;
        }
        Ok(())
    }
}

/// Optional overrides for a [`DependencyProfile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfileOverrides {
    /// Failures that trip the breaker.
    pub failure_threshold: Option<u32>,
    /// Open window in milliseconds.
    pub open_duration_ms: Option<u64>,
    /// Concurrent half-open probes.
    pub half_open_max_probes: Option<u32>,
    /// Whether non-retryable errors count against the breaker.
    pub count_non_retryable: Option<bool>,
    /// Maximum attempts per call.
    pub max_attempts: Option<u32>,
    /// First backoff delay in milliseconds.
    pub initial_delay_ms: Option<u64>,
    /// Backoff cap in milliseconds.
    pub max_delay_ms: Option<u64>,
    /// Backoff growth factor.
    pub backoff_multiplier: Option<f64>,
    /// Jitter fraction in `[0, 1)`.
    pub jitter_fraction: Option<f64>,
}

impl ProfileOverrides {
    /// Applies the set fields on top of `base`.
    ///
    /// Values are copied as written; [`DependencyProfile::validate`] reports
    /// anything out of range.
    pub fn apply(&self, base: DependencyProfile) -> DependencyProfile {
        let DependencyProfile {
            mut breaker,
            mut retry,
        } = base;

        if let Some(threshold) = self.failure_threshold {
            breaker.failure_threshold = threshold;
        }
        if let Some(ms) = self.open_duration_ms {
            breaker.open_duration = Duration::from_millis(ms);
        }
        if let Some(probes) = self.half_open_max_probes {
            breaker.half_open_max_probes = probes;
        }
        if let Some(count) = self.count_non_retryable {
            breaker.failure_policy = FailurePolicy {
                count_non_retryable: count,
            };
        }
        if let Some(attempts) = self.max_attempts {
            retry.max_attempts = attempts;
        }
        if let Some(ms) = self.initial_delay_ms {
            retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.max_delay_ms {
            retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(multiplier) = self.backoff_multiplier {
            retry.backoff_multiplier = multiplier;
        }
        if let Some(jitter) = self.jitter_fraction {
            retry.jitter_fraction = jitter;
        }

        DependencyProfile { breaker, retry }
    }
}
