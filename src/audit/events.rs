//! Audit event types and emission functions.

use crate::circuit_breaker::CircuitState;
use crate::gateway::CallOutcome;
use crate::health::{DependencyHealth, HealthReport, OverallHealth};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit event for a completed gateway call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Unique call ID.
    pub call_id: String,

    /// Dependency that was called.
    pub dependency: String,

    /// `"success"` or the error kind.
    pub outcome: String,

    /// Attempts started.
    pub attempts: u32,

    /// Total duration in milliseconds.
    pub elapsed_ms: u64,

    /// Breaker state after the call.
    pub breaker_state: CircuitState,
}

impl CallAuditEvent {
    /// Builds the event from a call outcome.
    pub fn from_outcome<T, E>(outcome: &CallOutcome<T, E>) -> Self {
        Self {
            timestamp: Utc::now(),
            call_id: outcome.call_id.to_string(),
            dependency: outcome.dependency.clone(),
            outcome: outcome
                .error_kind()
                .map_or("success", |kind| kind.name())
                .to_string(),
            attempts: outcome.attempts,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
            breaker_state: outcome.breaker_state,
        }
    }
}

impl AuditEvent for CallAuditEvent {
    fn event_type(&self) -> &'static str {
        "call_completed"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Audit event for an administrative breaker reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Dependency whose breaker was reset.
    pub dependency: String,

    /// Whether a breaker existed for the dependency.
    pub existed: bool,
}

impl AuditEvent for ResetAuditEvent {
    fn event_type(&self) -> &'static str {
        "breaker_reset"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Summary of one unhealthy dependency for audit logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySummary {
    /// Dependency name.
    pub dependency: String,
    /// Breaker state.
    pub state: CircuitState,
    /// Consecutive failures.
    pub failure_count: u32,
}

impl From<&DependencyHealth> for DependencySummary {
    fn from(d: &DependencyHealth) -> Self {
        Self {
            dependency: d.dependency.clone(),
            state: d.state,
            failure_count: d.failure_count,
        }
    }
}

/// Audit event for a health report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthAuditEvent {
    /// Timestamp of the report.
    pub timestamp: DateTime<Utc>,

    /// Aggregate health.
    pub overall_health: OverallHealth,

    /// Number of dependencies reported.
    pub dependency_count: usize,

    /// Dependencies whose breaker is not closed.
    pub impaired: Vec<DependencySummary>,
}

impl From<&HealthReport> for HealthAuditEvent {
    fn from(report: &HealthReport) -> Self {
        Self {
            timestamp: report.generated_at,
            overall_health: report.overall_health,
            dependency_count: report.dependencies.len(),
            impaired: report
                .dependencies
                .iter()
                .filter(|d| !d.state.is_closed())
                .map(DependencySummary::from)
                .collect(),
        }
    }
}

impl AuditEvent for HealthAuditEvent {
    fn event_type(&self) -> &'static str {
        "health_report"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a completed call.
pub fn emit_call_outcome<T, E>(outcome: &CallOutcome<T, E>) {
    let event = CallAuditEvent::from_outcome(outcome);

    tracing::info!(
        target: "railguard::audit",
        event_type = event.event_type(),
        call_id = %event.call_id,
        dependency = %event.dependency,
        outcome = %event.outcome,
        attempts = event.attempts,
        elapsed_ms = event.elapsed_ms,
        breaker_state = %event.breaker_state,
        "Call completed"
    );
}

/// Emits an audit event for an administrative reset.
pub fn emit_breaker_reset(dependency: &str, existed: bool) {
    let event = ResetAuditEvent {
        timestamp: Utc::now(),
        dependency: dependency.to_string(),
        existed,
    };

    tracing::info!(
        target: "railguard::audit",
        event_type = event.event_type(),
        dependency = %event.dependency,
        existed = event.existed,
        "Circuit breaker reset requested"
    );
}

/// Emits an audit event for a health report.
pub fn emit_health_report(report: &HealthReport) {
    let event = HealthAuditEvent::from(report);

    tracing::info!(
        target: "railguard::audit",
        event_type = event.event_type(),
        overall_health = %event.overall_health,
        dependency_count = event.dependency_count,
        impaired = ?event.impaired,
        impaired_count = event.impaired.len(),
        "Health report generated"
    );
}
