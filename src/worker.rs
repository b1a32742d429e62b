//! Worker pool bridging the queue and the bulk indexer.

use crate::indexer::BulkIndexer;
use crate::models::Document;
use crate::pipeline::{PipelineError, Processor};
use crate::queue::BoundedQueue;
use crate::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// How long an idle worker sleeps before polling the queue again.
const IDLE_BACKOFF: Duration = Duration::from_millis(200);

pub struct WorkerPool {
    num_workers: usize,
    queue: Arc<BoundedQueue>,
    processor: Arc<dyn Processor>,
    indexer: Arc<BulkIndexer>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        num_workers: usize,
        queue: Arc<BoundedQueue>,
        processor: Arc<dyn Processor>,
        indexer: Arc<BulkIndexer>,
    ) -> Self {
        Self {
            num_workers: num_workers.max(1),
            queue,
            processor,
            indexer,
            handles: Vec::new(),
        }
    }

    /// Launch the workers and return immediately.
    pub fn start(&mut self, token: CancellationToken) {
        info!(workers = self.num_workers, "starting worker pool");
        for id in 0..self.num_workers {
            let worker = run_worker(
                self.queue.clone(),
                self.processor.clone(),
                self.indexer.clone(),
                token.clone(),
            );
            self.handles
                .push(tokio::spawn(worker.instrument(info_span!("worker", worker_id = id))));
        }
    }

    /// Block until every worker has exited.
    pub async fn wait(&mut self) {
        for handle in self.handles.drain(..) {
            let _ = handle.await;
        }
    }
}

/// One worker's loop. Cancellation does not abandon buffered pages: the
/// worker keeps draining the queue and only exits once it runs dry.
async fn run_worker(
    queue: Arc<BoundedQueue>,
    processor: Arc<dyn Processor>,
    indexer: Arc<BulkIndexer>,
    token: CancellationToken,
) {
    info!("worker started");

    loop {
        let mut page = match queue.remove() {
            Ok(page) => page,
            Err(_) => {
                // An empty queue that can never refill means we are done.
                if token.is_cancelled() || queue.is_closed() {
                    break;
                }
                sleep(IDLE_BACKOFF).await;
                continue;
            }
        };

        let mut doc = Document::default();
        match processor.process(&mut page, &mut doc).await {
            Ok(()) => {
                debug!(url = %page.url, "processed page");
                indexer.add_document(doc);
            }
            Err(PipelineError::Duplicate) => {
                metrics::counter!(telemetry::DUPLICATES_DETECTED).increment(1);
                warn!(url = %page.url, "failed to process page: duplicate page detected");
            }
            Err(err) => {
                warn!(url = %page.url, error = %err, "failed to process page");
            }
        }
    }

    info!("worker stopped");
}
