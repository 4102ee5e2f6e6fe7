//! End-to-end behavior of the gateway, breaker and retry policy.

use railguard::circuit_breaker::{Outcome, PermitKind};
use railguard::core::{always_retry, never_retry, Clock, MockClock};
use railguard::gateway::CallOptions;
use railguard::prelude::*;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn gateway_with(clock: &MockClock, breaker: BreakerConfig, retry: RetryPolicy) -> IntegrationGateway {
    IntegrationGateway::builder()
        .with_clock(Arc::new(clock.clone()))
        .with_default_profile(DependencyProfile::new().with_breaker(breaker).with_retry(retry))
        .build()
        .unwrap()
}

async fn fail_once(gateway: &IntegrationGateway, dependency: &str) -> CallOutcome<(), UpstreamError> {
    gateway
        .invoke(dependency, |_| async {
            Err::<(), _>(UpstreamError::service_unavailable("psp", 503))
        })
        .await
}

async fn succeed_once(gateway: &IntegrationGateway, dependency: &str) -> CallOutcome<(), UpstreamError> {
    gateway
        .invoke(dependency, |_| async { Ok::<_, UpstreamError>(()) })
        .await
}

#[tokio::test]
async fn threshold_trip_rejects_before_work_runs() {
    for threshold in 1..=6 {
        let clock = MockClock::new();
        let gateway = gateway_with(
            &clock,
            BreakerConfig::default().with_failure_threshold(threshold),
            RetryPolicy::no_retry(),
        );

        for i in 1..=threshold {
            let outcome = fail_once(&gateway, "psp").await;
            assert_eq!(outcome.error_kind(), Some(ErrorKind::RetryExhausted));
            let expected = if i == threshold {
                CircuitState::Open
            } else {
                CircuitState::Closed
            };
            assert_eq!(outcome.breaker_state, expected);
        }

        let executed = &AtomicU32::new(0);
        let outcome = gateway
            .invoke("psp", move |_| async move {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(())
            })
            .await;

        assert_eq!(outcome.error_kind(), Some(ErrorKind::CircuitOpen));
        assert_eq!(outcome.attempts, 0);
        assert_eq!(executed.load(Ordering::SeqCst), 0);
        assert!(outcome.error().unwrap().is_service_unavailable());
    }
}

#[tokio::test]
async fn success_resets_consecutive_failures() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(3),
        RetryPolicy::no_retry(),
    );

    fail_once(&gateway, "psp").await;
    fail_once(&gateway, "psp").await;
    succeed_once(&gateway, "psp").await;
    fail_once(&gateway, "psp").await;
    let outcome = fail_once(&gateway, "psp").await;

    assert_eq!(outcome.breaker_state, CircuitState::Closed);
    assert_eq!(gateway.breaker("psp").snapshot().consecutive_failures, 2);
}

#[tokio::test]
async fn open_breaker_waits_out_its_window() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default()
            .with_failure_threshold(1)
            .with_open_duration(Duration::from_secs(30)),
        RetryPolicy::no_retry(),
    );
    fail_once(&gateway, "psp").await;

    for _ in 0..5 {
        clock.advance(Duration::from_secs(5));
        let outcome = succeed_once(&gateway, "psp").await;
        assert_eq!(outcome.error_kind(), Some(ErrorKind::CircuitOpen));
    }

    let rejected = succeed_once(&gateway, "psp").await;
    match rejected.error() {
        Some(GatewayError::CircuitOpen { retry_after, .. }) => {
            assert_eq!(*retry_after, Some(Duration::from_secs(5)));
        }
        other => panic!("expected circuit open, got {other:?}"),
    }

    clock.advance(Duration::from_secs(5));
    let breaker = gateway.breaker("psp");
    let probe = breaker.try_acquire().unwrap();
    assert_eq!(probe.kind(), PermitKind::Probe);
    assert!(breaker.try_acquire().is_err());
    probe.record(Outcome::Success);
}

#[test]
fn concurrent_callers_get_exactly_one_probe() {
    const CALLERS: usize = 16;

    let clock = MockClock::new();
    let registry = CircuitBreakerRegistry::with_clock(Arc::new(clock.clone()));
    let breaker = registry.get_or_create(
        "psp",
        &BreakerConfig::default().with_failure_threshold(1),
    );
    breaker.try_acquire().unwrap().record(Outcome::Failure);
    clock.advance(Duration::from_secs(30));

    let barrier = &Barrier::new(CALLERS);
    let shared = &breaker;
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    shared.try_acquire()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let (admitted, rejected): (Vec<_>, Vec<_>) = results.into_iter().partition(Result::is_ok);
    assert_eq!(admitted.len(), 1);
    assert_eq!(rejected.len(), CALLERS - 1);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    for permit in admitted.into_iter().flatten() {
        assert!(permit.is_probe());
        assert_eq!(permit.record(Outcome::Success), CircuitState::Closed);
    }
}

#[tokio::test]
async fn in_flight_probe_blocks_other_calls() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(1),
        RetryPolicy::no_retry(),
    );
    fail_once(&gateway, "psp").await;
    clock.advance(Duration::from_secs(30));

    let release = &Notify::new();
    let (probe, other, ()) = tokio::join!(
        gateway.invoke("psp", move |_| async move {
            release.notified().await;
            Ok::<_, UpstreamError>("probe")
        }),
        succeed_once(&gateway, "psp"),
        async {
            tokio::task::yield_now().await;
            release.notify_one();
        },
    );

    assert_eq!(other.error_kind(), Some(ErrorKind::CircuitOpen));
    assert_eq!(other.breaker_state, CircuitState::HalfOpen);
    assert_eq!(probe.value(), Some(&"probe"));
    assert_eq!(probe.breaker_state, CircuitState::Closed);
}

#[tokio::test]
async fn probe_success_closes_and_failure_reopens() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default()
            .with_failure_threshold(2)
            .with_open_duration(Duration::from_secs(10)),
        RetryPolicy::no_retry(),
    );

    fail_once(&gateway, "psp").await;
    fail_once(&gateway, "psp").await;
    clock.advance(Duration::from_secs(10));

    let failed_probe = fail_once(&gateway, "psp").await;
    assert_eq!(failed_probe.breaker_state, CircuitState::Open);
    let snapshot = gateway.breaker("psp").snapshot();
    assert_eq!(snapshot.consecutive_failures, 0);
    assert_eq!(snapshot.last_transition_at, clock.now());

    clock.advance(Duration::from_secs(9));
    let outcome = succeed_once(&gateway, "psp").await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::CircuitOpen));

    clock.advance(Duration::from_secs(1));
    let probe = succeed_once(&gateway, "psp").await;
    assert!(probe.is_success());
    assert_eq!(probe.breaker_state, CircuitState::Closed);
    assert_eq!(gateway.breaker("psp").snapshot().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn retries_record_one_outcome_per_call() {
    let clock = MockClock::new();
    let retry = RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(10))
        .with_jitter_fraction(0.0);
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(5),
        retry,
    );

    let outcome = fail_once(&gateway, "psp").await;
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.error_kind(), Some(ErrorKind::RetryExhausted));

    let snapshot = gateway.breaker("psp").snapshot();
    assert_eq!(snapshot.consecutive_failures, 1);
    assert_eq!(snapshot.metrics.failed_requests, 1);
    assert_eq!(snapshot.state, CircuitState::Closed);

    for _ in 0..4 {
        fail_once(&gateway, "psp").await;
    }
    assert_eq!(gateway.breaker("psp").state(), CircuitState::Open);
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_stops_after_first_attempt() {
    let gateway = IntegrationGateway::new();
    let calls = &AtomicU32::new(0);

    let outcome = gateway
        .invoke_with(
            "psp",
            move |_| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(UpstreamError::service_unavailable("psp", 503))
            },
            never_retry,
            CallOptions::default(),
        )
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.elapsed < Duration::from_millis(1));
    match outcome.into_result() {
        Err(GatewayError::NonRetryable { source, .. }) => {
            assert!(matches!(source, UpstreamError::ServiceUnavailable { status: 503, .. }));
        }
        other => panic!("expected non-retryable, got {other:?}"),
    }
}

#[test]
fn backoff_is_monotonic_and_capped() {
    let policies = [
        RetryPolicy::default(),
        RetryPolicy::new()
            .with_max_attempts(12)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(2))
            .with_backoff_multiplier(3.0),
        RetryPolicy::new()
            .with_max_attempts(50)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(60))
            .with_backoff_multiplier(1.5),
    ];

    for policy in &policies {
        let mut previous = Duration::ZERO;
        for attempt in 1..=policy.max_attempts {
            let delay = policy.base_delay(attempt);
            assert!(delay >= previous, "attempt {attempt}: {delay:?} < {previous:?}");
            assert!(delay <= policy.max_delay);
            previous = delay;
        }
    }
}

#[tokio::test]
async fn scenario_trip_then_probe_after_open_window() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default()
            .with_failure_threshold(3)
            .with_open_duration(Duration::from_secs(10)),
        RetryPolicy::no_retry(),
    );

    for _ in 0..3 {
        fail_once(&gateway, "bank").await;
    }
    assert_eq!(gateway.breaker("bank").state(), CircuitState::Open);

    clock.advance(Duration::from_secs(5));
    let early = succeed_once(&gateway, "bank").await;
    assert_eq!(early.error_kind(), Some(ErrorKind::CircuitOpen));

    clock.advance(Duration::from_secs(6));
    let breaker = gateway.breaker("bank");
    let permit = breaker.try_acquire().unwrap();
    assert!(permit.is_probe());
    assert_eq!(permit.record(Outcome::Success), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn scenario_two_failures_then_success() {
    let retry = RetryPolicy::new()
        .with_max_attempts(3)
        .with_initial_delay(Duration::from_millis(100))
        .with_backoff_multiplier(2.0)
        .with_jitter_fraction(0.0);
    let gateway = IntegrationGateway::builder()
        .with_default_profile(DependencyProfile::new().with_retry(retry))
        .build()
        .unwrap();

    let calls = &AtomicU32::new(0);
    let outcome = gateway
        .invoke("ledger", move |_| async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(UpstreamError::timeout("ledger", Duration::from_secs(1)))
            } else {
                Ok("posted")
            }
        })
        .await;

    assert_eq!(outcome.value(), Some(&"posted"));
    assert_eq!(outcome.attempts, 3);
    assert!(outcome.elapsed >= Duration::from_millis(300));
    assert_eq!(gateway.breaker("ledger").snapshot().metrics.failed_requests, 0);
}

#[tokio::test(start_paused = true)]
async fn scenario_deadline_cancels_slow_work() {
    let gateway = IntegrationGateway::new();

    let outcome = gateway
        .invoke_with(
            "slow-api",
            |_| async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, UpstreamError>(())
            },
            always_retry,
            CallOptions::new().with_deadline(Duration::from_millis(50)),
        )
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(outcome.attempts, 1);
    assert!(outcome.elapsed < Duration::from_millis(500));

    let snapshot = gateway.breaker("slow-api").snapshot();
    assert_eq!(snapshot.consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn caller_cancellation_interrupts_backoff() {
    let retry = RetryPolicy::new()
        .with_max_attempts(5)
        .with_initial_delay(Duration::from_secs(10))
        .with_jitter_fraction(0.0);
    let gateway = IntegrationGateway::builder()
        .with_default_profile(DependencyProfile::new().with_retry(retry))
        .build()
        .unwrap();

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        canceller.cancel();
    });

    let outcome = gateway
        .invoke_with(
            "psp",
            |_| async { Err::<(), _>(UpstreamError::service_unavailable("psp", 502)) },
            always_retry,
            CallOptions::new().with_cancellation(token),
        )
        .await;

    assert_eq!(outcome.attempts, 1);
    assert!(outcome.elapsed < Duration::from_secs(10));
    match outcome.into_result() {
        Err(GatewayError::Cancelled { last_error, .. }) => assert!(last_error.is_some()),
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test]
async fn breakers_are_independent_per_dependency() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(1),
        RetryPolicy::no_retry(),
    );

    fail_once(&gateway, "psp").await;
    let other = succeed_once(&gateway, "ach").await;

    assert!(other.is_success());
    let report = gateway.health_reporter().snapshot_all();
    assert_eq!(report.overall_health, OverallHealth::Unhealthy);
    assert_eq!(report.dependency("ach").unwrap().state, CircuitState::Closed);
    assert_eq!(report.dependency("psp").unwrap().state, CircuitState::Open);
}

#[tokio::test]
async fn reset_is_idempotent() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(1),
        RetryPolicy::no_retry(),
    );
    fail_once(&gateway, "psp").await;

    assert!(gateway.reset("psp"));
    assert!(gateway.reset("psp"));
    let snapshot = gateway.breaker("psp").snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert!(gateway.health_reporter().overall_health() == OverallHealth::Healthy);
}

#[tokio::test]
async fn cancelled_call_never_reaches_the_breaker() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(1),
        RetryPolicy::no_retry(),
    );
    let token = CancellationToken::new();
    token.cancel();

    let executed = &AtomicU32::new(0);
    let outcome = gateway
        .invoke_with(
            "psp",
            move |_| async move {
                executed.fetch_add(1, Ordering::SeqCst);
                Ok::<_, UpstreamError>(())
            },
            always_retry,
            CallOptions::new().with_cancellation(token),
        )
        .await;

    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(outcome.attempts, 0);
    assert_eq!(outcome.breaker_state, CircuitState::Closed);
    assert_eq!(executed.load(Ordering::SeqCst), 0);
    assert!(gateway.registry().get("psp").is_none());

    assert!(succeed_once(&gateway, "psp").await.is_success());
}

#[tokio::test(start_paused = true)]
async fn expired_deadline_keeps_the_probe_slot() {
    let clock = MockClock::new();
    let gateway = gateway_with(
        &clock,
        BreakerConfig::default().with_failure_threshold(1),
        RetryPolicy::no_retry(),
    );
    fail_once(&gateway, "psp").await;
    clock.advance(Duration::from_secs(30));

    let outcome = gateway
        .invoke_with(
            "psp",
            |_| async { Ok::<_, UpstreamError>(()) },
            always_retry,
            CallOptions::new().with_deadline(Duration::ZERO),
        )
        .await;
    assert_eq!(outcome.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(outcome.breaker_state, CircuitState::Open);

    let probe = succeed_once(&gateway, "psp").await;
    assert!(probe.is_success());
    assert_eq!(probe.breaker_state, CircuitState::Closed);
}

#[tokio::test]
async fn reset_applies_the_current_profile() {
    let clock = MockClock::new();
    let registry = Arc::new(CircuitBreakerRegistry::with_clock(Arc::new(clock.clone())));
    let lenient = IntegrationGateway::builder()
        .with_registry(Arc::clone(&registry))
        .with_default_profile(DependencyProfile::new().with_retry(RetryPolicy::no_retry()))
        .build()
        .unwrap();
    let strict = IntegrationGateway::builder()
        .with_registry(Arc::clone(&registry))
        .with_profile(
            "psp",
            DependencyProfile::new()
                .with_breaker(BreakerConfig::default().with_failure_threshold(1))
                .with_retry(RetryPolicy::no_retry()),
        )
        .build()
        .unwrap();

    succeed_once(&lenient, "psp").await;
    let outcome = fail_once(&strict, "psp").await;
    assert_eq!(outcome.breaker_state, CircuitState::Closed);
    assert_eq!(registry.get("psp").unwrap().config().failure_threshold, 5);

    assert!(strict.reset("psp"));
    assert_eq!(registry.get("psp").unwrap().config().failure_threshold, 1);

    let outcome = fail_once(&strict, "psp").await;
    assert_eq!(outcome.breaker_state, CircuitState::Open);
}
