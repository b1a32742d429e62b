//! Bulk indexer for the search backend.
//!
//! Documents accumulate in a mutex-guarded buffer; a background loop flushes
//! them as an NDJSON bulk payload whenever the buffer crosses the threshold,
//! the flush interval elapses, or shutdown begins. Each flush runs its HTTP
//! request in its own task with bounded exponential-backoff retries, tracked
//! so `stop` can wait for in-flight requests to finish.
//!
//! Document ids are derived deterministically from the (canonical) URL, so
//! a retried flush overwrites rather than duplicates.

mod backoff;

pub use backoff::backoff_delay;

use crate::models::Document;
use crate::telemetry;
use once_cell::sync::Lazy;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";
/// Longest a document id may grow after sanitization.
const MAX_DOC_ID_LEN: usize = 100;

static BULK_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("failed to build bulk HTTP client")
});

pub struct BulkIndexer {
    buffer: Mutex<Vec<Document>>,
    threshold: usize,
    flush_tx: mpsc::Sender<()>,
    done: CancellationToken,
    tracker: TaskTracker,
    loop_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
    backend_url: String,
    index_name: String,
    max_retries: u32,
}

impl BulkIndexer {
    /// Create the indexer and spawn its flush loop.
    pub fn new(
        threshold: usize,
        flush_interval: Duration,
        max_retries: u32,
        backend_url: String,
        index_name: String,
    ) -> std::sync::Arc<Self> {
        let flush_interval = flush_interval.max(Duration::from_millis(1));
        let (flush_tx, flush_rx) = mpsc::channel(1);
        let indexer = std::sync::Arc::new(Self {
            buffer: Mutex::new(Vec::with_capacity(threshold)),
            threshold: threshold.max(1),
            flush_tx,
            done: CancellationToken::new(),
            tracker: TaskTracker::new(),
            loop_handle: Mutex::new(None),
            backend_url,
            index_name,
            max_retries,
        });

        let handle = tokio::spawn(indexer.clone().run(flush_rx, flush_interval));
        *indexer.lock_loop_handle() = Some(handle);
        indexer
    }

    /// Buffer a document, signaling a flush once the threshold is reached.
    pub fn add_document(&self, doc: Document) {
        let buffered = {
            let mut buffer = self.lock_buffer();
            buffer.push(doc);
            buffer.len()
        };
        if buffered >= self.threshold {
            // Capacity-1 channel; a pending signal is good enough.
            let _ = self.flush_tx.try_send(());
        }
    }

    /// Flush whatever is buffered and wait for all in-flight bulk requests
    /// to complete.
    pub async fn stop(&self) {
        self.done.cancel();
        let handle = self.lock_loop_handle().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.tracker.close();
        self.tracker.wait().await;
        info!("bulk indexer stopped");
    }

    async fn run(
        self: std::sync::Arc<Self>,
        mut flush_rx: mpsc::Receiver<()>,
        flush_interval: Duration,
    ) {
        let mut ticker = interval(flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; swallow it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.done.cancelled() => {
                    self.flush();
                    return;
                }
                _ = flush_rx.recv() => self.flush(),
                _ = ticker.tick() => self.flush(),
            }
        }
    }

    /// Swap the buffer out and hand the payload to a request task. Returns
    /// without waiting on the network so the loop stays responsive.
    fn flush(&self) {
        let docs = {
            let mut buffer = self.lock_buffer();
            if buffer.is_empty() {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        let payload = build_bulk_payload(&docs, &self.index_name);

        metrics::counter!(telemetry::BULK_FLUSHES).increment(1);
        metrics::counter!(telemetry::DOCUMENTS_INDEXED).increment(docs.len() as u64);
        info!(documents = docs.len(), "flushing documents to search backend");

        self.tracker.spawn(send_bulk_request(
            self.backend_url.clone(),
            payload,
            self.max_retries,
        ));
    }

    fn lock_buffer(&self) -> std::sync::MutexGuard<'_, Vec<Document>> {
        self.buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_loop_handle(
        &self,
    ) -> std::sync::MutexGuard<'_, Option<tokio::task::JoinHandle<()>>> {
        self.loop_handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// POST the payload, retrying with backoff on transport errors and non-2xx
/// statuses until the retry budget runs out.
async fn send_bulk_request(url: String, payload: Vec<u8>, max_retries: u32) {
    let mut attempt = 0u32;
    loop {
        let result = BULK_CLIENT
            .post(&url)
            .header(CONTENT_TYPE, NDJSON_CONTENT_TYPE)
            .body(payload.clone())
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!("bulk indexing successful");
                return;
            }
            Ok(response) => {
                warn!(status = %response.status(), attempt, "bulk request rejected");
            }
            Err(err) => {
                warn!(error = %err, attempt, "bulk request failed");
            }
        }

        if attempt >= max_retries {
            metrics::counter!(telemetry::BULK_FAILURES).increment(1);
            error!(attempts = attempt + 1, "bulk request exhausted retries");
            return;
        }

        let delay = backoff_delay(attempt);
        debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
        sleep(delay).await;
        attempt += 1;
    }
}

/// Serialize documents into the backend's bulk format: a meta action line
/// and a source line per document, each newline-terminated.
pub fn build_bulk_payload(docs: &[Document], index_name: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    for doc in docs {
        let meta = serde_json::json!({
            "index": { "_index": index_name, "_id": document_id(doc) }
        });
        let doc_line = match serde_json::to_vec(doc) {
            Ok(line) => line,
            Err(err) => {
                error!(url = %doc.url, error = %err, "failed to serialize document, skipping");
                continue;
            }
        };
        payload.extend_from_slice(meta.to_string().as_bytes());
        payload.push(b'\n');
        payload.extend_from_slice(&doc_line);
        payload.push(b'\n');
    }
    payload
}

/// Deterministic backend id: the canonical URL when present, else the URL,
/// stripped of its scheme and squeezed into the backend's id alphabet.
pub fn document_id(doc: &Document) -> String {
    let canonical = doc.canonical_url.trim();
    let base = if canonical.is_empty() {
        doc.url.trim()
    } else {
        canonical
    };

    let base = base
        .strip_prefix("https://")
        .or_else(|| base.strip_prefix("http://"))
        .unwrap_or(base);

    let mut id: String = base
        .chars()
        .map(|c| match c {
            '/' | '?' | '&' | '=' | '#' | ':' | ' ' => '_',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    id.truncate(MAX_DOC_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str, canonical: &str) -> Document {
        Document {
            url: url.to_string(),
            canonical_url: canonical.to_string(),
            ..Document::default()
        }
    }

    #[test]
    fn document_id_prefers_canonical() {
        let d = doc("https://example.com/page", "https://example.com/canonical");
        assert_eq!(document_id(&d), "example.com_canonical");
    }

    #[test]
    fn document_id_falls_back_to_url() {
        assert_eq!(document_id(&doc("https://ex.com/a", "")), "ex.com_a");
        assert_eq!(document_id(&doc("https://ex.com/a", "   ")), "ex.com_a");
    }

    #[test]
    fn document_id_sanitizes_special_characters() {
        let d = doc("http://ex.com/a?b=1&c=2#frag x:y", "");
        assert_eq!(document_id(&d), "ex.com_a_b_1_c_2_frag_x_y");
    }

    #[test]
    fn document_id_drops_out_of_alphabet_characters() {
        let d = doc("https://ex.com/päge%20", "");
        assert_eq!(document_id(&d), "ex.com_pge20");
    }

    #[test]
    fn document_id_truncates_long_urls() {
        let d = doc(&format!("https://ex.com/{}", "a".repeat(300)), "");
        assert_eq!(document_id(&d).len(), MAX_DOC_ID_LEN);
    }

    #[test]
    fn payload_has_two_lines_per_document() {
        let docs = vec![
            doc("https://ex.com/a", ""),
            doc("https://ex.com/b", ""),
            doc("https://ex.com/c", ""),
        ];
        let payload = build_bulk_payload(&docs, "test_index");
        let text = String::from_utf8(payload).unwrap();

        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(lines.len(), 6);

        // Alternating meta and source lines, in insertion order.
        let meta: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(meta["index"]["_index"], "test_index");
        assert_eq!(meta["index"]["_id"], "ex.com_a");
        let source: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(source["url"], "https://ex.com/a");
        let meta_b: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(meta_b["index"]["_id"], "ex.com_b");
    }

    #[test]
    fn payload_ends_with_newline() {
        let payload = build_bulk_payload(&[doc("https://ex.com/a", "")], "idx");
        assert_eq!(payload.last(), Some(&b'\n'));
    }
}
