//! Batch-coalescing client for the NLP enrichment service.
//!
//! Callers submit one text at a time; a background task coalesces them into
//! `POST <base>/batch` requests, gated by a rate limiter and a circuit
//! breaker. Each submission carries a one-shot mailbox that receives exactly
//! one outcome — success, error, circuit-open, or shutdown — no matter what
//! happens to the batch. The batching task is the sole writer; a caller that
//! gave up waiting just leaves an orphaned receiver behind, which is fine
//! because the one-shot send never blocks.

mod limiter;

pub use limiter::{RateLimitExceeded, RateLimiter};

use crate::breaker::{BreakerError, BreakerState, CircuitBreaker};
use crate::telemetry;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Consecutive failures before the breaker opens.
const BREAKER_FAILURE_THRESHOLD: u32 = 5;
/// How long the breaker stays open before admitting a probe.
const BREAKER_RESET_TIMEOUT: Duration = Duration::from_secs(30);
/// Batch requests per second, with a small burst.
const LIMITER_RATE: f64 = 5.0;
const LIMITER_BURST: u32 = 10;
/// Longest a batch will wait on the rate limiter before erroring out.
const LIMITER_MAX_WAIT: Duration = Duration::from_secs(5);
/// Per-request timeout; batches can be slow under NLP service load.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static NLP_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("failed to build NLP HTTP client")
});

/// A single entity span returned by the NLP service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Entity {
    pub text: String,
    pub label: String,
}

/// Result of enriching one text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NlpOutcome {
    pub entities: Vec<Entity>,
    pub keyphrases: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NlpError {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error("rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("nlp service returned status {0}")]
    Status(u16),
    #[error("nlp request failed: {0}")]
    Transport(String),
    #[error("nlp response had {got} results for a batch of {want}")]
    ResultCountMismatch { want: usize, got: usize },
    #[error("nlp client is stopped")]
    Stopped,
}

struct BatchItem {
    text: String,
    needs_summary: bool,
    mailbox: oneshot::Sender<Result<NlpOutcome, NlpError>>,
}

#[derive(Serialize)]
struct BatchRequest {
    documents: Vec<BatchDocument>,
}

#[derive(Serialize)]
struct BatchDocument {
    text: String,
    needs_summary: bool,
}

#[derive(Deserialize)]
struct BatchResponse {
    results: Vec<BatchResult>,
}

#[derive(Deserialize)]
struct BatchResult {
    #[serde(default)]
    entities: Vec<Entity>,
    #[serde(default)]
    keyphrases: Vec<String>,
    #[serde(default)]
    summary: String,
}

pub struct NlpClient {
    base_url: String,
    batch_size: usize,
    current_batch: Mutex<Vec<BatchItem>>,
    flush_tx: mpsc::Sender<()>,
    stop: CancellationToken,
    breaker: CircuitBreaker,
    limiter: RateLimiter,
}

impl NlpClient {
    /// Create the client and spawn its batching task.
    pub fn new(base_url: String, batch_size: usize, batch_timeout: Duration) -> Arc<Self> {
        // tokio panics on a zero-period interval.
        let batch_timeout = batch_timeout.max(Duration::from_millis(1));
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let client = Arc::new(Self {
            base_url,
            batch_size: batch_size.max(1),
            current_batch: Mutex::new(Vec::with_capacity(batch_size)),
            flush_tx,
            stop: CancellationToken::new(),
            breaker: CircuitBreaker::new(
                "nlp-service",
                BREAKER_FAILURE_THRESHOLD,
                BREAKER_RESET_TIMEOUT,
            ),
            limiter: RateLimiter::new(LIMITER_RATE, LIMITER_BURST),
        });

        tokio::spawn(client.clone().run(flush_rx, batch_timeout));
        client
    }

    /// Submit a text for enrichment and wait for its batch to complete.
    /// Empty text resolves immediately without touching the service.
    pub async fn process(&self, text: &str) -> Result<NlpOutcome, NlpError> {
        if text.is_empty() {
            return Ok(NlpOutcome::default());
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut batch = self.lock_batch();
            if self.stop.is_cancelled() {
                return Err(NlpError::Stopped);
            }
            batch.push(BatchItem {
                text: text.to_string(),
                needs_summary: false,
                mailbox: tx,
            });
            if batch.len() >= self.batch_size {
                // Capacity-1 channel; a pending signal is good enough.
                let _ = self.flush_tx.try_send(());
            }
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(NlpError::Stopped),
        }
    }

    /// Ask the batching task to exit at its next wakeup. Items still waiting
    /// in the batch at that point receive a shutdown error.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    async fn run(self: Arc<Self>, mut flush_rx: mpsc::Receiver<()>, batch_timeout: Duration) {
        let mut ticker = interval(batch_timeout);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; swallow it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => {
                    let batch = self.swap_batch();
                    deliver_error(batch, NlpError::Stopped);
                    return;
                }
                _ = flush_rx.recv() => self.dispatch_batch().await,
                _ = ticker.tick() => self.dispatch_batch().await,
            }
        }
    }

    async fn dispatch_batch(&self) {
        let batch = self.swap_batch();
        if batch.is_empty() {
            return;
        }

        metrics::counter!(telemetry::NLP_BATCHES).increment(1);
        metrics::histogram!(telemetry::NLP_BATCH_SIZE).record(batch.len() as f64);

        if self.breaker.state() == BreakerState::Open {
            warn!("circuit breaker open, skipping NLP batch");
            deliver_error(batch, NlpError::CircuitOpen);
            return;
        }

        if let Err(err) = self.limiter.acquire(LIMITER_MAX_WAIT).await {
            warn!(error = %err, "rate limit exceeded for NLP batch");
            deliver_error(batch, NlpError::RateLimited(err.to_string()));
            return;
        }

        let request = BatchRequest {
            documents: batch
                .iter()
                .map(|item| BatchDocument {
                    text: item.text.clone(),
                    needs_summary: item.needs_summary,
                })
                .collect(),
        };
        let url = format!("{}/batch", self.base_url);

        let response = self
            .breaker
            .execute(|| async {
                let started = Instant::now();
                let response = NLP_CLIENT
                    .post(&url)
                    .json(&request)
                    .send()
                    .await
                    .map_err(|err| {
                        metrics::counter!(telemetry::NLP_ERRORS).increment(1);
                        NlpError::Transport(err.to_string())
                    })?;

                metrics::histogram!(telemetry::NLP_LATENCY_SECONDS)
                    .record(started.elapsed().as_secs_f64());

                if !response.status().is_success() {
                    metrics::counter!(telemetry::NLP_ERRORS).increment(1);
                    return Err(NlpError::Status(response.status().as_u16()));
                }

                response
                    .json::<BatchResponse>()
                    .await
                    .map_err(|err| NlpError::Transport(err.to_string()))
            })
            .await;

        let parsed = match response {
            Ok(parsed) => parsed,
            Err(BreakerError::Open) => {
                deliver_error(batch, NlpError::CircuitOpen);
                return;
            }
            Err(BreakerError::Inner(err)) => {
                error!(error = %err, "NLP batch request failed");
                deliver_error(batch, err);
                return;
            }
        };

        if parsed.results.len() != batch.len() {
            let err = NlpError::ResultCountMismatch {
                want: batch.len(),
                got: parsed.results.len(),
            };
            error!(error = %err, "NLP batch response mismatch");
            deliver_error(batch, err);
            return;
        }

        for (item, result) in batch.into_iter().zip(parsed.results) {
            let _ = item.mailbox.send(Ok(NlpOutcome {
                entities: result.entities,
                keyphrases: result.keyphrases,
                summary: result.summary,
            }));
        }
    }

    fn swap_batch(&self) -> Vec<BatchItem> {
        std::mem::take(&mut *self.lock_batch())
    }

    fn lock_batch(&self) -> std::sync::MutexGuard<'_, Vec<BatchItem>> {
        self.current_batch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn deliver_error(batch: Vec<BatchItem>, err: NlpError) {
    for item in batch {
        let _ = item.mailbox.send(Err(err.clone()));
    }
}
