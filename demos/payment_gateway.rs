//! Payment gateway example demonstrating breaker and retry behavior.
//!
//! This example shows how to:
//! - Configure per-dependency profiles
//! - Retry transient processor failures with backoff
//! - Fail fast while a processor's circuit is open
//! - Recover through a half-open probe
//! - Report health for a monitoring endpoint
//!
//! Run with: cargo run --example payment_gateway

use railguard::audit;
use railguard::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// A processor that fails a configurable share of requests.
struct FlakyProcessor {
    name: &'static str,
    fail_rate: f64,
    requests: AtomicU32,
}

impl FlakyProcessor {
    fn new(name: &'static str, fail_rate: f64) -> Self {
        Self {
            name,
            fail_rate,
            requests: AtomicU32::new(0),
        }
    }

    async fn charge(&self, amount_cents: u64) -> Result<String, UpstreamError> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(Duration::from_millis(20)).await;

        if rand::random::<f64>() < self.fail_rate {
            return Err(UpstreamError::service_unavailable(self.name, 503));
        }
        Ok(format!("{}-ch-{n}-{amount_cents}", self.name))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Payment Gateway Example ===\n");

    let processor_profile = DependencyProfile::new()
        .with_breaker(
            BreakerConfig::default()
                .with_failure_threshold(3)
                .with_open_duration(Duration::from_secs(2)),
        )
        .with_retry(
            RetryPolicy::new()
                .with_max_attempts(2)
                .with_initial_delay(Duration::from_millis(50))
                .with_max_delay(Duration::from_millis(200)),
        );

    let gateway = IntegrationGateway::builder()
        .with_profile("processor", processor_profile)
        .with_default_deadline(Duration::from_secs(5))
        .build()?;

    let processor = FlakyProcessor::new("processor", 0.9);

    println!("Sending charges to an unreliable processor...\n");

    for i in 1..=8u64 {
        let outcome = gateway
            .invoke("processor", |_attempt| processor.charge(i * 1000))
            .await;
        audit::emit_call_outcome(&outcome);

        match &outcome.result {
            Ok(charge_id) => println!("Charge #{i}: succeeded ({charge_id})"),
            Err(GatewayError::CircuitOpen { retry_after, .. }) => {
                println!("Charge #{i}: circuit OPEN, retry after {retry_after:?}")
            }
            Err(err) => println!("Charge #{i}: failed: {err}"),
        }
        println!(
            "  attempts = {}, breaker = {}",
            outcome.attempts, outcome.breaker_state
        );
    }

    let report = gateway.health_reporter().snapshot_all();
    audit::emit_health_report(&report);
    println!("\nHealth: {}", serde_json::to_string_pretty(&report.to_json())?);

    println!("\n=== Demonstrating Recovery ===\n");
    println!("Waiting for the open window to elapse...");
    tokio::time::sleep(Duration::from_millis(2100)).await;

    let healthy = FlakyProcessor::new("processor", 0.0);
    let outcome = gateway
        .invoke("processor", |_attempt| healthy.charge(500))
        .await;
    println!(
        "Probe charge: {:?}, breaker = {}",
        outcome.result.as_ref().map_err(ToString::to_string),
        outcome.breaker_state
    );

    println!("\n=== Demonstrating Reset ===\n");
    gateway.breaker("processor").force_open();
    println!("Forced open: {}", gateway.breaker("processor").state());
    gateway.reset("processor");
    println!("After reset: {}", gateway.breaker("processor").state());

    println!("\nMetrics: {:?}", gateway.breaker("processor").metrics());
    println!("\n=== Example Complete ===");
    Ok(())
}
