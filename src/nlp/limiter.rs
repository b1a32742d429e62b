//! Token-bucket rate limiter for outbound batch requests.
//!
//! A small bucket refilled continuously at `rate` tokens per second, capped
//! at `burst`. `acquire` waits for a token but never longer than the given
//! bound; callers that cannot be served in time get an error instead of an
//! unbounded queue of sleepers.

use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("rate limit wait would exceed {0:?}")]
pub struct RateLimitExceeded(pub Duration);

pub struct RateLimiter {
    rate: f64,
    burst: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// `rate` tokens per second with `burst` capacity. The bucket starts full.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            rate,
            burst: f64::from(burst),
            state: Mutex::new(BucketState {
                tokens: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take one token, sleeping until one is available. Fails immediately if
    /// the projected wait exceeds `max_wait`.
    pub async fn acquire(&self, max_wait: Duration) -> Result<(), RateLimitExceeded> {
        let wait = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
            state.last_refill = now;

            // Reserve the token now; the shortfall determines the sleep.
            state.tokens -= 1.0;
            if state.tokens >= 0.0 {
                return Ok(());
            }
            let wait = Duration::from_secs_f64(-state.tokens / self.rate);
            if wait > max_wait {
                // Give the reservation back.
                state.tokens += 1.0;
                return Err(RateLimitExceeded(max_wait));
            }
            wait
        };

        tokio::time::sleep(wait).await;
        Ok(())
    }
}
