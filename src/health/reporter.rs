//! Read-only health view over a breaker registry.

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
use crate::core::Clock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Aggregate health across every known dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    /// Every breaker is closed.
    #[default]
    Healthy,
    /// At least one breaker is probing recovery.
    Degraded,
    /// At least one breaker is open.
    Unhealthy,
}

impl OverallHealth {
    /// Folds breaker states: any open breaker wins, then any half-open one.
    pub fn from_states(states: impl IntoIterator<Item = CircuitState>) -> Self {
        states
            .into_iter()
            .map(|state| match state {
                CircuitState::Closed => Self::Healthy,
                CircuitState::HalfOpen => Self::Degraded,
                CircuitState::Open => Self::Unhealthy,
            })
            .max()
            .unwrap_or_default()
    }

    /// Returns the name used in health payloads.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Health of one dependency, in the shape monitoring endpoints consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyHealth {
    /// Dependency name.
    pub dependency: String,
    /// Breaker state.
    pub state: CircuitState,
    /// Consecutive failures counted toward tripping.
    pub failure_count: u32,
    /// When the last failure was recorded.
    pub last_failure: Option<DateTime<Utc>>,
    /// When the breaker last changed state.
    pub last_transition: DateTime<Utc>,
}

impl From<&BreakerSnapshot> for DependencyHealth {
    fn from(snapshot: &BreakerSnapshot) -> Self {
        Self {
            dependency: snapshot.name.clone(),
            state: snapshot.state,
            failure_count: snapshot.consecutive_failures,
            last_failure: snapshot.last_failure_at,
            last_transition: snapshot.last_transition_at,
        }
    }
}

/// A point-in-time health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Aggregate health.
    pub overall_health: OverallHealth,
    /// Per-dependency health, sorted by name.
    pub dependencies: Vec<DependencyHealth>,
    /// When the report was taken.
    pub generated_at: DateTime<Utc>,
}

impl HealthReport {
    /// Returns `true` if every dependency is healthy.
    pub fn is_healthy(&self) -> bool {
        self.overall_health == OverallHealth::Healthy
    }

    /// Returns the entry for `dependency`, if known.
    pub fn dependency(&self, dependency: &str) -> Option<&DependencyHealth> {
        self.dependencies.iter().find(|d| d.dependency == dependency)
    }

    /// Renders the report as a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "overall_health": self.overall_health,
            "generated_at": self.generated_at,
            "dependencies": self.dependencies,
        })
    }
}

/// Read-only reporter over a [`CircuitBreakerRegistry`].
///
/// Reporting never creates a breaker and never moves one between states:
/// an open breaker whose window has elapsed is still reported as open
/// until a call is admitted.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    registry: Arc<CircuitBreakerRegistry>,
}

impl HealthReporter {
    /// Creates a reporter over `registry`.
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the health of one dependency, if it has a breaker.
    pub fn snapshot(&self, dependency: &str) -> Option<DependencyHealth> {
        self.registry
            .get(dependency)
            .map(|breaker| DependencyHealth::from(&breaker.snapshot()))
    }

    /// Returns a report covering every dependency.
    pub fn snapshot_all(&self) -> HealthReport {
        let dependencies: Vec<DependencyHealth> = self
            .registry
            .list_all()
            .iter()
            .map(|(_, snapshot)| DependencyHealth::from(snapshot))
            .collect();

        HealthReport {
            overall_health: OverallHealth::from_states(dependencies.iter().map(|d| d.state)),
            dependencies,
            generated_at: self.registry.clock().now(),
        }
    }

    /// Returns only the aggregate health.
    pub fn overall_health(&self) -> OverallHealth {
        OverallHealth::from_states(
            self.registry
                .list_all()
                .into_iter()
                .map(|(_, snapshot)| snapshot.state),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{BreakerConfig, Outcome};
    use crate::core::MockClock;
    use std::time::Duration;

    fn setup() -> (MockClock, Arc<CircuitBreakerRegistry>, HealthReporter) {
        let clock = MockClock::new();
        let registry = Arc::new(CircuitBreakerRegistry::with_clock(Arc::new(clock.clone())));
        let reporter = HealthReporter::new(Arc::clone(&registry));
        (clock, registry, reporter)
    }

    fn trip(registry: &CircuitBreakerRegistry, name: &str) {
        let config = BreakerConfig::default().with_failure_threshold(1);
        let breaker = registry.get_or_create(name, &config);
        breaker
            .try_acquire()
            .unwrap()
            .record(Outcome::Failure);
    }

    #[test]
    fn test_precedence() {
        use CircuitState::*;
        assert_eq!(OverallHealth::from_states([]), OverallHealth::Healthy);
        assert_eq!(OverallHealth::from_states([Closed, Closed]), OverallHealth::Healthy);
        assert_eq!(OverallHealth::from_states([Closed, HalfOpen]), OverallHealth::Degraded);
        assert_eq!(
            OverallHealth::from_states([HalfOpen, Open, Closed]),
            OverallHealth::Unhealthy
        );
    }

    #[test]
    fn test_empty_registry_is_healthy() {
        let (_, _, reporter) = setup();
        let report = reporter.snapshot_all();
        assert!(report.is_healthy());
        assert!(report.dependencies.is_empty());
        assert_eq!(reporter.snapshot("missing"), None);
    }

    #[test]
    fn test_open_breaker_is_unhealthy() {
        let (_, registry, reporter) = setup();
        registry.get_or_create("geo", &BreakerConfig::default());
        trip(&registry, "psp");

        let report = reporter.snapshot_all();
        assert_eq!(report.overall_health, OverallHealth::Unhealthy);
        assert_eq!(report.dependencies.len(), 2);

        let psp = report.dependency("psp").unwrap();
        assert_eq!(psp.state, CircuitState::Open);
        assert_eq!(psp.failure_count, 1);
        assert!(psp.last_failure.is_some());
    }

    #[test]
    fn test_reporting_does_not_transition() {
        let (clock, registry, reporter) = setup();
        trip(&registry, "psp");
        clock.advance(Duration::from_secs(3600));

        assert_eq!(reporter.overall_health(), OverallHealth::Unhealthy);
        assert_eq!(reporter.snapshot("psp").unwrap().state, CircuitState::Open);
        assert_eq!(registry.get("psp").unwrap().state(), CircuitState::Open);
        assert_eq!(reporter.snapshot("unknown"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_half_open_is_degraded() {
        let (clock, registry, reporter) = setup();
        trip(&registry, "psp");
        clock.advance(Duration::from_secs(31));

        let probe = registry.get("psp").unwrap().try_acquire().unwrap();
        assert_eq!(reporter.overall_health(), OverallHealth::Degraded);
        probe.record(Outcome::Success);
        assert_eq!(reporter.overall_health(), OverallHealth::Healthy);
    }

    #[test]
    fn test_json_payload() {
        let (_, registry, reporter) = setup();
        trip(&registry, "psp");

        let json = reporter.snapshot_all().to_json();
        assert_eq!(json["overall_health"], "unhealthy");
        let entry = &json["dependencies"][0];
        assert_eq!(entry["dependency"], "psp");
        assert_eq!(entry["state"], "open");
        assert_eq!(entry["failure_count"], 1);
        assert!(entry["last_failure"].is_string());
    }
}
