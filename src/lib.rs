//! # Railguard
//!
//! Per-dependency circuit breakers and bounded retries for outbound calls
//! to payment processors, banking rails and other external services.
//!
//! ## Overview
//!
//! Every outbound call passes through an [`IntegrationGateway`], which:
//!
//! - Tracks failure history per named dependency
//! - Fails fast while a dependency's circuit is open, with no I/O
//! - Admits a bounded number of probe calls to test recovery
//! - Retries transient failures with capped exponential backoff and jitter
//! - Honours caller deadlines and cancellation tokens during backoff
//! - Exposes breaker health for monitoring endpoints
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use railguard::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = IntegrationGateway::builder()
//!         .with_profile("stripe", DependencyProfile::critical())
//!         .build()?;
//!
//!     let outcome = gateway
//!         .invoke("stripe", |_attempt| async {
//!             // call the processor here
//!             Ok::<_, UpstreamError>("ch_123")
//!         })
//!         .await;
//!
//!     println!("{:?} after {} attempt(s)", outcome.result, outcome.attempts);
//!
//!     let health = gateway.health_reporter().snapshot_all();
//!     println!("{}", health.to_json());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: Clock abstraction, error taxonomy and retryability
//! - **Circuit Breaker**: The per-dependency state machine and registry
//! - **Gateway**: Retry policy, cancellation and call orchestration
//! - **Health**: Read-only reporting over the registry
//! - **Audit**: Structured logging of calls and operator actions

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod audit;
pub mod circuit_breaker;
pub mod core;
pub mod gateway;
pub mod health;

// Re-export commonly used types at the crate root
pub use crate::core::{Classify, ConfigError, ErrorKind, GatewayError, UpstreamError};

pub use crate::circuit_breaker::{BreakerConfig, CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use crate::gateway::{
    CallOptions, CallOutcome, DependencyProfile, GatewayConfig, IntegrationGateway, RetryPolicy,
};
pub use crate::health::{HealthReport, HealthReporter, OverallHealth};

/// Prelude module for convenient imports.
///
/// ```rust
/// use railguard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{
        BreakerConfig, CircuitBreaker, CircuitBreakerRegistry, CircuitState, Outcome,
    };
    pub use crate::core::{Classify, ConfigError, ErrorKind, GatewayError, UpstreamError};
    pub use crate::gateway::{
        CallOptions, CallOutcome, DependencyProfile, GatewayConfig, IntegrationGateway,
        RetryPolicy,
    };
    pub use crate::health::{HealthReport, HealthReporter, OverallHealth};
}
