//! Metric names and registration.
//!
//! All counters/gauges/histograms used by the pipeline are named here so the
//! exposition surface is greppable in one place. Recording happens at the
//! call sites via the `metrics` macros; the Prometheus recorder is installed
//! by `main` before anything records.

use metrics::{describe_counter, describe_gauge, describe_histogram};

pub const PAGES_PROCESSED: &str = "indexer_pages_processed_total";
pub const DUPLICATES_DETECTED: &str = "indexer_duplicates_detected_total";
pub const NON_ENGLISH_SKIPPED: &str = "indexer_non_english_pages_skipped_total";
pub const HIGH_SPAM_SKIPPED: &str = "indexer_high_spam_pages_skipped_total";

pub const DOCUMENTS_INDEXED: &str = "indexer_documents_indexed_total";
pub const BULK_FLUSHES: &str = "indexer_bulk_flushes_total";
pub const BULK_FAILURES: &str = "indexer_bulk_failures_total";

pub const NLP_BATCHES: &str = "indexer_nlp_batches_total";
pub const NLP_ERRORS: &str = "indexer_nlp_errors_total";
pub const NLP_BATCH_SIZE: &str = "indexer_nlp_batch_size";
pub const NLP_LATENCY_SECONDS: &str = "indexer_nlp_latency_seconds";

pub const LANGUAGE_DETECTION_SECONDS: &str = "indexer_language_detection_seconds";
pub const LANGUAGE_DETECTION_FAILURES: &str = "indexer_language_detection_failures_total";
pub const SPAM_SCORE: &str = "indexer_spam_score";

pub const CIRCUIT_BREAKER_STATE: &str = "indexer_circuit_breaker_state";

/// Attach help text to every metric the service emits.
pub fn describe() {
    describe_counter!(PAGES_PROCESSED, "Total number of pages processed successfully");
    describe_counter!(
        DUPLICATES_DETECTED,
        "Total number of pages that were flagged as duplicates"
    );
    describe_counter!(
        NON_ENGLISH_SKIPPED,
        "Total number of pages skipped for failing the English-language gate"
    );
    describe_counter!(
        HIGH_SPAM_SKIPPED,
        "Total number of pages skipped for exceeding the spam block threshold"
    );
    describe_counter!(
        DOCUMENTS_INDEXED,
        "Total number of documents flushed to the search backend"
    );
    describe_counter!(
        BULK_FLUSHES,
        "Total number of bulk flush operations performed"
    );
    describe_counter!(
        BULK_FAILURES,
        "Total number of bulk requests that exhausted their retries"
    );
    describe_counter!(NLP_BATCHES, "Total number of NLP batches dispatched");
    describe_counter!(NLP_ERRORS, "Total number of failed NLP service calls");
    describe_histogram!(NLP_BATCH_SIZE, "Documents per dispatched NLP batch");
    describe_histogram!(NLP_LATENCY_SECONDS, "NLP batch request latency in seconds");
    describe_histogram!(
        LANGUAGE_DETECTION_SECONDS,
        "Language detection latency in seconds"
    );
    describe_counter!(
        LANGUAGE_DETECTION_FAILURES,
        "Total number of texts the language detector could not classify"
    );
    describe_histogram!(SPAM_SCORE, "Spam score distribution of processed pages");
    describe_gauge!(
        CIRCUIT_BREAKER_STATE,
        "Circuit breaker state per service: 0 closed, 1 half-open, 2 open"
    );
}
