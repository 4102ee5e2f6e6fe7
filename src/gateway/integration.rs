//! The integration gateway: admission control, retries and outcome
//! recording for every outbound call.

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitState, Outcome};
use crate::core::{default_is_retryable, ArcClock, Classify, ConfigError, ErrorKind, GatewayError};
use crate::gateway::cancel::{CallOptions, CancelScope};
use crate::gateway::config::{DependencyProfile, GatewayConfig};
use crate::gateway::outcome::CallOutcome;
use crate::gateway::retry::{Attempt, RetryError};
use crate::health::HealthReporter;

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Builder for creating an [`IntegrationGateway`].
#[derive(Debug, Default)]
pub struct IntegrationGatewayBuilder {
    registry: Option<Arc<CircuitBreakerRegistry>>,
    clock: Option<ArcClock>,
    default_profile: DependencyProfile,
    profiles: HashMap<String, DependencyProfile>,
    default_deadline: Option<Duration>,
}

impl IntegrationGatewayBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses an existing registry, e.g. one shared with other gateways.
    ///
    /// Takes precedence over [`with_clock`](Self::with_clock).
    pub fn with_registry(mut self, registry: Arc<CircuitBreakerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the clock for a registry created by the builder.
    pub fn with_clock(mut self, clock: ArcClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets the profile used by dependencies without their own.
    pub fn with_default_profile(mut self, profile: DependencyProfile) -> Self {
        self.default_profile = profile;
        self
    }

    /// Sets the profile for one dependency.
    pub fn with_profile(mut self, dependency: impl Into<String>, profile: DependencyProfile) -> Self {
        self.profiles.insert(dependency.into(), profile);
        self
    }

    /// Sets the deadline for calls that don't carry their own.
    pub fn with_default_deadline(mut self, deadline: Duration) -> Self {
        self.default_deadline = Some(deadline);
        self
    }

    /// Applies a configuration document: its defaults, named profiles and
    /// default deadline replace what the builder holds.
    pub fn with_config(mut self, config: &GatewayConfig) -> Self {
        self.default_profile = config.default_profile();
        self.profiles = config.profiles().into_iter().collect();
        self.default_deadline = config.default_deadline();
        self
    }

    /// Builds the gateway, validating every profile.
    pub fn build(self) -> Result<IntegrationGateway, ConfigError> {
        self.default_profile.validate()?;
        for (name, profile) in &self.profiles {
            profile.validate().map_err(|err| ConfigError::Profile {
                dependency: name.clone(),
                source: Box::new(err),
            })?;
        }

        let registry = match (self.registry, self.clock) {
            (Some(registry), _) => registry,
            (None, Some(clock)) => Arc::new(CircuitBreakerRegistry::with_clock(clock)),
            (None, None) => Arc::new(CircuitBreakerRegistry::new()),
        };

        Ok(IntegrationGateway {
            registry,
            default_profile: self.default_profile,
            profiles: self.profiles,
            default_deadline: self.default_deadline,
        })
    }
}

/// The entry point every outbound call passes through.
///
/// For each call the gateway resolves the dependency's breaker, asks it
/// for admission, runs the work under the dependency's retry policy and
/// records exactly one outcome, however many attempts the retry loop made.
/// An open circuit costs a mutex acquisition and no I/O.
///
/// # Example
///
/// ```rust,no_run
/// use railguard::gateway::IntegrationGateway;
/// use railguard::core::UpstreamError;
///
/// # async fn run() {
/// let gateway = IntegrationGateway::new();
///
/// let outcome = gateway
///     .invoke("stripe", |_attempt| async {
///         // submit the charge ...
///         Ok::<_, UpstreamError>("ch_123")
///     })
///     .await;
///
/// match outcome.result {
///     Ok(charge_id) => println!("charged: {charge_id}"),
///     Err(err) if err.is_service_unavailable() => println!("try later: {err}"),
///     Err(err) => println!("rejected: {err}"),
/// }
/// # }
/// ```
pub struct IntegrationGateway {
    registry: Arc<CircuitBreakerRegistry>,
    default_profile: DependencyProfile,
    profiles: HashMap<String, DependencyProfile>,
    default_deadline: Option<Duration>,
}

impl IntegrationGateway {
    /// Creates a gateway with default profiles and its own registry.
    pub fn new() -> Self {
        Self {
            registry: Arc::new(CircuitBreakerRegistry::new()),
            default_profile: DependencyProfile::default(),
            profiles: HashMap::new(),
            default_deadline: None,
        }
    }

    /// Creates a new builder.
    pub fn builder() -> IntegrationGatewayBuilder {
        IntegrationGatewayBuilder::new()
    }

    /// Runs `work` against `dependency` using the error type's own
    /// retryability classification and the gateway's default deadline.
    pub async fn invoke<T, E, F, Fut>(&self, dependency: &str, work: F) -> CallOutcome<T, E>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        self.invoke_with(
            dependency,
            work,
            default_is_retryable::<E>,
            CallOptions::default(),
        )
        .await
    }

    /// Runs `work` against `dependency` with a caller-supplied
    /// retryability predicate and call options.
    pub async fn invoke_with<T, E, F, Fut, P>(
        &self,
        dependency: &str,
        work: F,
        is_retryable: P,
        options: CallOptions,
    ) -> CallOutcome<T, E>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let call_id = Uuid::new_v4();
        let started = Instant::now();
        let profile = self.profile(dependency);
        let scope = CancelScope::new(
            options.cancellation.as_ref(),
            options.deadline.or(self.default_deadline),
        );

        // A call cancelled before admission never touches the breaker.
        if scope.is_fired() {
            tracing::debug!(
                dependency = %dependency,
                call_id = %call_id,
                "Call cancelled before admission"
            );
            return CallOutcome {
                call_id,
                dependency: dependency.to_string(),
                result: Err(GatewayError::Cancelled {
                    dependency: dependency.to_string(),
                    attempts: 0,
                    elapsed: started.elapsed(),
                    last_error: None,
                }),
                attempts: 0,
                elapsed: started.elapsed(),
                breaker_state: self
                    .registry
                    .get(dependency)
                    .map_or(CircuitState::Closed, |breaker| breaker.state()),
            };
        }

        let breaker = self.registry.get_or_create(dependency, &profile.breaker);

        let permit = match breaker.try_acquire() {
            Ok(permit) => permit,
            Err(rejection) => {
                return CallOutcome {
                    call_id,
                    dependency: dependency.to_string(),
                    result: Err(GatewayError::CircuitOpen {
                        dependency: dependency.to_string(),
                        retry_after: rejection.retry_after,
                    }),
                    attempts: 0,
                    elapsed: started.elapsed(),
                    breaker_state: rejection.state,
                };
            }
        };

        if permit.is_probe() {
            tracing::debug!(
                dependency = %dependency,
                call_id = %call_id,
                "Admitted half-open probe"
            );
        }

        let retried = profile.retry.execute(work, is_retryable, &scope).await;
        let attempts = retried.attempts;
        let elapsed = started.elapsed();
        let failure_policy = &breaker.config().failure_policy;

        let (result, outcome) = match retried.result {
            Ok(value) => (Ok(value), Outcome::Success),
            Err(RetryError::NonRetryable(source)) => {
                let outcome = if failure_policy.should_count(ErrorKind::NonRetryable) {
                    Outcome::Failure
                } else {
                    Outcome::Success
                };
                let error = GatewayError::NonRetryable {
                    dependency: dependency.to_string(),
                    source,
                };
                (Err(error), outcome)
            }
            Err(RetryError::Exhausted(source)) => {
                let error = GatewayError::RetryExhausted {
                    dependency: dependency.to_string(),
                    attempts,
                    elapsed,
                    source,
                };
                (Err(error), Outcome::Failure)
            }
            Err(RetryError::Cancelled { last_error }) => {
                let outcome = if attempts == 0 {
                    Outcome::Abandoned
                } else {
                    Outcome::Failure
                };
                let error = GatewayError::Cancelled {
                    dependency: dependency.to_string(),
                    attempts,
                    elapsed,
                    last_error,
                };
                (Err(error), outcome)
            }
        };

        let breaker_state = permit.record(outcome);

        match &result {
            Ok(_) => tracing::debug!(
                dependency = %dependency,
                call_id = %call_id,
                attempts = attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                "Call succeeded"
            ),
            Err(err) => tracing::warn!(
                dependency = %dependency,
                call_id = %call_id,
                kind = %err.kind(),
                attempts = attempts,
                elapsed_ms = elapsed.as_millis() as u64,
                breaker_state = %breaker_state,
                "Call failed"
            ),
        }

        CallOutcome {
            call_id,
            dependency: dependency.to_string(),
            result,
            attempts,
            elapsed,
            breaker_state,
        }
    }

    /// Returns the breaker for `dependency`, creating it if needed.
    pub fn breaker(&self, dependency: &str) -> Arc<CircuitBreaker> {
        self.registry
            .get_or_create(dependency, &self.profile(dependency).breaker)
    }

    /// Replaces a dependency's breaker with a closed one built from the
    /// dependency's current profile.
    ///
    /// Idempotent; returns `false` if the dependency has never been called.
    pub fn reset(&self, dependency: &str) -> bool {
        let existed = self
            .registry
            .reset_with(dependency, &self.profile(dependency).breaker);
        crate::audit::emit_breaker_reset(dependency, existed);
        existed
    }

    /// Returns the profile used for `dependency`.
    pub fn profile(&self, dependency: &str) -> &DependencyProfile {
        self.profiles
            .get(dependency)
            .unwrap_or(&self.default_profile)
    }

    /// Returns a read-only health reporter over this gateway's breakers.
    pub fn health_reporter(&self) -> HealthReporter {
        HealthReporter::new(Arc::clone(&self.registry))
    }

    /// Returns the breaker registry.
    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Returns the default deadline.
    pub fn default_deadline(&self) -> Option<Duration> {
        self.default_deadline
    }
}

impl Default for IntegrationGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IntegrationGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationGateway")
            .field("registry", &self.registry)
            .field("default_profile", &self.default_profile)
            .field("profile_count", &self.profiles.len())
            .field("default_deadline", &self.default_deadline)
            .finish()
    }
}
