//! Circuit breaker for flaky external calls.
//!
//! Classic three-state gate: closed counts consecutive failures, open
//! rejects until the reset timeout has elapsed, half-open admits a single
//! probe whose outcome decides the next state. The wrapped call always runs
//! outside the state lock.

use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

use crate::telemetry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    HalfOpen,
    Open,
}

impl BreakerState {
    /// Gauge encoding: 0 closed, 1 half-open, 2 open.
    fn as_gauge(self) -> f64 {
        match self {
            BreakerState::Closed => 0.0,
            BreakerState::HalfOpen => 1.0,
            BreakerState::Open => 2.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error(transparent)]
    Inner(E),
}

struct State {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

pub struct CircuitBreaker {
    service: &'static str,
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(service: &'static str, failure_threshold: u32, reset_timeout: Duration) -> Self {
        let breaker = Self {
            service,
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            state: Mutex::new(State {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        };
        breaker.record_state(BreakerState::Closed);
        breaker
    }

    /// Run `op` through the breaker. Rejected calls never invoke `op`.
    pub async fn execute<T, E, F, Fut>(&self, op: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let probing = {
            let mut state = self.lock();
            match state.state {
                BreakerState::Closed => false,
                BreakerState::Open => {
                    let expired = state
                        .opened_at
                        .is_some_and(|at| at.elapsed() > self.reset_timeout);
                    if !expired {
                        return Err(BreakerError::Open);
                    }
                    state.state = BreakerState::HalfOpen;
                    state.probe_in_flight = true;
                    self.record_state(BreakerState::HalfOpen);
                    info!(service = self.service, "circuit half-open, allowing test request");
                    true
                }
                BreakerState::HalfOpen => {
                    // A probe is already deciding the circuit's fate.
                    if state.probe_in_flight {
                        return Err(BreakerError::Open);
                    }
                    state.probe_in_flight = true;
                    true
                }
            }
        };

        let result = op().await;

        let mut state = self.lock();
        if probing {
            state.probe_in_flight = false;
        }
        match result {
            Ok(value) => {
                if state.state == BreakerState::HalfOpen {
                    state.state = BreakerState::Closed;
                    self.record_state(BreakerState::Closed);
                    info!(service = self.service, "circuit closed after successful test");
                }
                state.failures = 0;
                Ok(value)
            }
            Err(err) => {
                state.failures += 1;
                state.opened_at = Some(Instant::now());
                if state.state == BreakerState::HalfOpen
                    || state.failures >= self.failure_threshold
                {
                    state.state = BreakerState::Open;
                    self.record_state(BreakerState::Open);
                    warn!(
                        service = self.service,
                        failures = state.failures,
                        "circuit opened due to failures"
                    );
                }
                Err(BreakerError::Inner(err))
            }
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    fn record_state(&self, state: BreakerState) {
        metrics::gauge!(telemetry::CIRCUIT_BREAKER_STATE, "service" => self.service)
            .set(state.as_gauge());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("boom")]
    struct Boom;

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<Boom>> {
        breaker.execute(|| async { Err::<(), _>(Boom) }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError<Boom>> {
        breaker.execute(|| async { Ok::<_, Boom>(()) }).await
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new("test", 3, Duration::from_secs(60));

        for _ in 0..2 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
            assert_eq!(breaker.state(), BreakerState::Closed);
        }
        assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner(_))));
        assert_eq!(breaker.state(), BreakerState::Open);

        // Rejected without invoking the closure.
        let invoked = std::sync::atomic::AtomicBool::new(false);
        let result: Result<(), BreakerError<Boom>> = breaker
            .execute(|| {
                invoked.store(true, std::sync::atomic::Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open)));
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn probe_success_closes_the_circuit() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(20));
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn probe_failure_reopens_the_circuit() {
        let breaker = CircuitBreaker::new("test", 1, Duration::from_millis(20));
        fail(&breaker).await.unwrap_err();

        tokio::time::sleep(Duration::from_millis(40)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);

        // Still rejecting inside the fresh reset window.
        assert!(matches!(succeed(&breaker).await, Err(BreakerError::Open)));
    }

    #[tokio::test]
    async fn half_open_admits_a_single_probe() {
        let breaker = std::sync::Arc::new(CircuitBreaker::new(
            "test",
            1,
            Duration::from_millis(10),
        ));
        fail(&breaker).await.unwrap_err();
        tokio::time::sleep(Duration::from_millis(30)).await;

        // First caller becomes the probe and parks inside the closure.
        let probe = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .execute(|| async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, Boom>(())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        // Second caller is rejected while the probe is in flight.
        assert!(matches!(succeed(&breaker).await, Err(BreakerError::Open)));

        probe.await.unwrap().unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }
}
