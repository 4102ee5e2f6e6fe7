//! Circuit breakers for outbound dependencies.
//!
//! The circuit breaker pattern stops calling a failing dependency for a
//! cooldown period, then lets a single probe through to detect recovery.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through.
//! - **Open**: The dependency is failing; calls are rejected immediately.
//! - **Half-Open**: A probe call tests whether the dependency recovered.
//!
//! ## Usage
//!
//! ```rust
//! use railguard::circuit_breaker::{BreakerConfig, CircuitBreakerRegistry, Outcome};
//! use std::time::Duration;
//!
//! let registry = CircuitBreakerRegistry::new();
//! let config = BreakerConfig::default()
//!     .with_failure_threshold(5)
//!     .with_open_duration(Duration::from_secs(30));
//!
//! let breaker = registry.get_or_create("stripe", &config);
//! match breaker.try_acquire() {
//!     Ok(permit) => {
//!         permit.record(Outcome::Success);
//!     }
//!     Err(rejection) => println!("fail fast, retry after {:?}", rejection.retry_after),
//! }
//! ```

mod breaker;
mod config;
mod registry;
mod state;

pub use breaker::{CircuitBreaker, Outcome, Permit, PermitKind, Rejection};
pub use config::{BreakerConfig, FailurePolicy};
pub use registry::CircuitBreakerRegistry;
pub use state::{BreakerMetrics, BreakerSnapshot, CircuitState};
