//! Core types and traits for the railguard library.
//!
//! This module provides the building blocks shared by the breaker, retry
//! and gateway layers:
//!
//! - [`clock`] - The `Clock` time source and its test double
//! - [`classify`] - Retryability classification of work errors
//! - [`error`] - Structured error types

pub mod classify;
pub mod clock;
pub mod error;

pub use classify::{always_retry, default_is_retryable, never_retry, Classify};
pub use clock::{ArcClock, Clock, MockClock, SystemClock};
pub use error::{ConfigError, ErrorKind, GatewayError, GatewayResult, UpstreamError};
