//! Registry of circuit breakers keyed by dependency name.

use crate::circuit_breaker::breaker::CircuitBreaker;
use crate::circuit_breaker::config::BreakerConfig;
use crate::circuit_breaker::state::BreakerSnapshot;
use crate::core::clock::{ArcClock, SystemClock};

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

/// Owns one [`CircuitBreaker`] per dependency name.
///
/// Breakers are created lazily on first reference and live as long as the
/// registry. The map is write-locked only to insert a new breaker; every
/// other access takes the read lock, and a breaker handle once obtained
/// needs no map lock at all.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    clock: ArcClock,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry using the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty registry whose breakers read the given clock.
    pub fn with_clock(clock: ArcClock) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Returns the breaker for `name`, creating it with `config` if needed.
    ///
    /// Idempotent: the first caller's configuration wins and later callers
    /// get the same instance whatever configuration they pass.
    pub fn get_or_create(&self, name: &str, config: &BreakerConfig) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.get(name) {
            return breaker;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            tracing::debug!(
                dependency = %name,
                failure_threshold = config.failure_threshold,
                open_duration_ms = config.open_duration.as_millis() as u64,
                "Registering circuit breaker"
            );
            Arc::new(CircuitBreaker::with_clock(
                name,
                config.clone(),
                Arc::clone(&self.clock),
            ))
        });
        Arc::clone(breaker)
    }

    /// Returns the breaker for `name`, if one has been registered.
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(name)
            .cloned()
    }

    /// Forces the named breaker back to closed with zeroed counters.
    ///
    /// Idempotent. Returns `false` if no breaker exists under that name.
    pub fn reset(&self, name: &str) -> bool {
        match self.get(name) {
            Some(breaker) => {
                breaker.reset();
                true
            }
            None => false,
        }
    }

    /// Replaces the named breaker with a fresh, closed one built from
    /// `config`.
    ///
    /// This is the only way to change a registered breaker's configuration.
    /// The old breaker is reset as well, so permits it already issued can't
    /// drive transitions; handles to it should be fetched again. Returns
    /// `false`, registering nothing, if no breaker exists under that name.
    pub fn reset_with(&self, name: &str, config: &BreakerConfig) -> bool {
        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(slot) = breakers.get_mut(name) else {
            return false;
        };

        slot.reset();
        *slot = Arc::new(CircuitBreaker::with_clock(
            name,
            config.clone(),
            Arc::clone(&self.clock),
        ));
        tracing::info!(
            dependency = %name,
            failure_threshold = config.failure_threshold,
            open_duration_ms = config.open_duration.as_millis() as u64,
            half_open_max_probes = config.half_open_max_probes,
            "Circuit breaker reconfigured"
        );
        true
    }

    /// Resets every registered breaker.
    pub fn reset_all(&self) {
        for breaker in self.breakers() {
            breaker.reset();
        }
    }

    /// Returns a snapshot of every breaker, sorted by name.
    pub fn list_all(&self) -> Vec<(String, BreakerSnapshot)> {
        let mut all: Vec<_> = self
            .breakers()
            .into_iter()
            .map(|breaker| (breaker.name().to_string(), breaker.snapshot()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Returns the registered dependency names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns the number of registered breakers.
    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Returns `true` if no breaker has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the clock shared by this registry's breakers.
    pub fn clock(&self) -> &ArcClock {
        &self.clock
    }

    // Clone the handles out so snapshots are taken without the map lock.
    fn breakers(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("dependencies", &self.names())
            .finish()
    }
}
