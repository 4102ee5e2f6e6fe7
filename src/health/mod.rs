//! Health reporting for monitoring endpoints.

mod reporter;

pub use reporter::{DependencyHealth, HealthReport, HealthReporter, OverallHealth};
