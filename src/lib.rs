//! crawlsink: the ingestion boundary between a crawler fleet and a search
//! backend. Crawled page records come in over HTTP, get cleaned,
//! deduplicated, language-gated, spam-scored and NLP-enriched, and leave as
//! bulk index requests.

pub mod admin;
pub mod breaker;
pub mod config;
pub mod dedup;
pub mod indexer;
pub mod models;
pub mod nlp;
pub mod pipeline;
pub mod queue;
pub mod telemetry;
pub mod worker;
