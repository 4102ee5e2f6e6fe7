//! The integration gateway and its retry machinery.
//!
//! Every outbound call goes through [`IntegrationGateway::invoke`] (or
//! [`IntegrationGateway::invoke_with`]), which applies breaker admission,
//! runs the work under a bounded [`RetryPolicy`], and records one outcome.

mod cancel;
mod config;
mod integration;
mod outcome;
mod retry;

pub use cancel::{CallOptions, CancelScope};
pub use config::{DependencyProfile, GatewayConfig, ProfileOverrides};
pub use integration::{IntegrationGateway, IntegrationGatewayBuilder};
pub use outcome::CallOutcome;
pub use retry::{Attempt, RetryError, RetryOutcome, RetryPolicy};
