//! Composition root and lifecycle owner.
//!
//! The administrator wires the queue, pipeline, worker pool, bulk indexer
//! and NLP client together, exposes the observers the health endpoint
//! needs, and owns the shutdown order: close the queue, drain the workers,
//! stop the indexer (final flush + in-flight requests), stop the NLP client.

pub mod http;

use crate::config::Config;
use crate::dedup::{Deduper, RedisDeduper};
use crate::indexer::BulkIndexer;
use crate::models::PageData;
use crate::nlp::NlpClient;
use crate::pipeline::enrich::NlpEnricher;
use crate::pipeline::language::LanguageDetector;
use crate::pipeline::{PagePipeline, Processor};
use crate::queue::{BoundedQueue, QueueError};
use crate::worker::WorkerPool;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Administrator {
    queue: Arc<BoundedQueue>,
    indexer: Arc<BulkIndexer>,
    nlp: Arc<NlpClient>,
    workers: Mutex<WorkerPool>,
    start_time: DateTime<Utc>,
    num_workers: usize,
}

impl Administrator {
    /// Build the full production stack from configuration. Failures here
    /// (queue capacity, Redis connectivity) are startup failures.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let queue = Arc::new(BoundedQueue::new(config.queue_capacity)?);
        let deduper: Arc<dyn Deduper> = Arc::new(RedisDeduper::connect(config).await?);

        let nlp = NlpClient::new(
            config.nlp_service_url.clone(),
            config.nlp_batch_size,
            Duration::from_millis(config.nlp_batch_timeout_ms),
        );
        let indexer = BulkIndexer::new(
            config.bulk_threshold,
            Duration::from_secs(config.flush_interval_secs),
            config.max_retries,
            config.elasticsearch_url.clone(),
            config.index_name.clone(),
        );

        // The language models are big and slow to load; build them once
        // here and share the detector across workers.
        let detector = Arc::new(LanguageDetector::new());
        let enricher = Arc::new(NlpEnricher::new(nlp.clone()));
        let processor: Arc<dyn Processor> = Arc::new(PagePipeline::new(
            deduper,
            enricher,
            detector,
            config.spam_block_threshold,
        ));

        Ok(Self::new(
            queue,
            processor,
            indexer,
            nlp,
            config.num_workers,
        ))
    }

    /// Wire pre-built components together. Tests use this to swap in
    /// in-memory dedup, stub enrichers, or mock backends.
    pub fn new(
        queue: Arc<BoundedQueue>,
        processor: Arc<dyn Processor>,
        indexer: Arc<BulkIndexer>,
        nlp: Arc<NlpClient>,
        num_workers: usize,
    ) -> Self {
        let num_workers = num_workers.max(1);
        let workers = WorkerPool::new(
            num_workers,
            queue.clone(),
            processor,
            indexer.clone(),
        );
        Self {
            queue,
            indexer,
            nlp,
            workers: Mutex::new(workers),
            start_time: Utc::now(),
            num_workers,
        }
    }

    /// Hand a page record to the queue. Returns quickly so the ingress
    /// handler can answer the crawler.
    pub fn enqueue_page_data(&self, page: PageData) -> Result<(), QueueError> {
        self.queue.insert(page)
    }

    /// Start the worker pool bound to the given cancellation token.
    pub async fn process_and_index(&self, token: CancellationToken) {
        self.workers.lock().await.start(token);
    }

    /// Serve the HTTP surface until the token is cancelled.
    pub async fn serve(
        self: &Arc<Self>,
        port: &str,
        metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        http::serve(self.clone(), port, metrics_handle, shutdown).await
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn worker_count(&self) -> usize {
        self.num_workers
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Graceful shutdown, in dependency order.
    pub async fn stop(&self) {
        info!("beginning shutdown sequence");

        self.queue.close();

        info!("waiting for worker pool to finish processing buffered items");
        self.workers.lock().await.wait().await;

        info!("worker pool drained, stopping bulk indexer");
        self.indexer.stop().await;

        self.nlp.stop();
        info!("administrator stopped");
    }
}
