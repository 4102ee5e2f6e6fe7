//! Retryability classification.
//!
//! The retry loop never inspects errors itself. It asks a predicate
//! supplied by the caller; types implementing [`Classify`] get the default
//! predicate for free.

use crate::core::error::UpstreamError;
use std::io;

/// Classifies an error as transient or permanent.
pub trait Classify {
    /// Returns `true` if the failure is transient and the call may succeed
    /// if repeated (timeouts, 5xx-equivalents, connection resets).
    fn is_retryable(&self) -> bool;
}

impl Classify for UpstreamError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::ConnectionFailed { .. }
                | Self::ServiceUnavailable { .. }
                | Self::RateLimited { .. }
        )
    }
}

impl Classify for io::Error {
    fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            io::ErrorKind::TimedOut
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        )
    }
}

impl<T: Classify + ?Sized> Classify for Box<T> {
    fn is_retryable(&self) -> bool {
        (**self).is_retryable()
    }
}

/// The default retryability predicate: network and timeout errors are
/// retryable, everything else is not.
pub fn default_is_retryable<E: Classify>(error: &E) -> bool {
    error.is_retryable()
}

/// A predicate that treats every error as retryable.
pub fn always_retry<E>(_: &E) -> bool {
    true
}

/// A predicate that treats every error as permanent.
pub fn never_retry<E>(_: &E) -> bool {
    false
}
