//! Structured audit logging.
//!
//! This module provides functions for emitting structured audit events
//! using the `tracing` crate under the `railguard::audit` target. Events
//! can be captured by any tracing subscriber; storing them is up to the
//! application.

mod events;

pub use events::{
    emit_breaker_reset, emit_call_outcome, emit_health_report, AuditEvent, CallAuditEvent,
    DependencySummary, HealthAuditEvent, ResetAuditEvent,
};
