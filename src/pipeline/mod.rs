//! Per-page processing pipeline.
//!
//! Clean → dedup → language → spam → enrich → quality, in that order, with
//! the first failing stage short-circuiting the rest. Skip decisions
//! (duplicate, non-English, high-spam) are ordinary errors here; the worker
//! decides how loudly to log them.

pub mod enrich;
pub mod language;
pub mod spam;

use crate::dedup::{Deduper, generate_signature};
use crate::models::{Document, PageData};
use crate::telemetry;
use async_trait::async_trait;
use enrich::{Enricher, quality_score};
use language::{LanguageDetector, LanguageError};
use spam::SpamScorer;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("duplicate page detected")]
    Duplicate,
    #[error("not an english page, skipping")]
    NonEnglish,
    #[error("high spam content detected, skipping")]
    HighSpam,
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// High-level contract for turning a page record into an indexable document.
#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, page: &mut PageData, doc: &mut Document)
    -> Result<(), PipelineError>;
}

/// The production pipeline.
pub struct PagePipeline {
    deduper: Arc<dyn Deduper>,
    enricher: Arc<dyn Enricher>,
    language: Arc<LanguageDetector>,
    spam: SpamScorer,
}

impl PagePipeline {
    pub fn new(
        deduper: Arc<dyn Deduper>,
        enricher: Arc<dyn Enricher>,
        language: Arc<LanguageDetector>,
        spam_block_threshold: u32,
    ) -> Self {
        Self {
            deduper,
            enricher,
            language,
            spam: SpamScorer::new(spam_block_threshold),
        }
    }

    /// As `new`, with a caller-supplied phrase table.
    pub fn with_spam_scorer(
        deduper: Arc<dyn Deduper>,
        enricher: Arc<dyn Enricher>,
        language: Arc<LanguageDetector>,
        spam: SpamScorer,
    ) -> Self {
        Self {
            deduper,
            enricher,
            language,
            spam,
        }
    }
}

#[async_trait]
impl Processor for PagePipeline {
    async fn process(
        &self,
        page: &mut PageData,
        doc: &mut Document,
    ) -> Result<(), PipelineError> {
        clean_and_normalize(page, doc)?;

        let signature = generate_signature(&doc.visible_text);
        if self.deduper.is_duplicate(&signature).await {
            return Err(PipelineError::Duplicate);
        }
        self.deduper.store_signature(&signature).await;

        match self.language.detect(&doc.visible_text) {
            Ok(code) => page.language = code,
            Err(LanguageError::NotEnglish { code }) => {
                page.language = code;
                metrics::counter!(telemetry::NON_ENGLISH_SKIPPED).increment(1);
                info!(url = %page.url, language = %page.language, "skipping non-english page");
                return Err(PipelineError::NonEnglish);
            }
            Err(LanguageError::DetectionFailed) => {
                warn!(url = %page.url, "language detection failed");
                page.language = "unknown".to_string();
            }
        }

        let verdict = self.spam.detect(&doc.visible_text);
        doc.spam_score = verdict.score;
        if verdict.is_high_spam {
            metrics::counter!(telemetry::HIGH_SPAM_SKIPPED).increment(1);
            info!(url = %page.url, spam_score = verdict.score, "skipping high spam content");
            return Err(PipelineError::HighSpam);
        }

        if let Err(err) = self.enricher.enrich(page, doc).await {
            warn!(url = %page.url, error = %err, "enrichment failed, indexing unenriched");
        }

        // Spam lowers quality even below the block threshold.
        doc.quality_score = quality_score(doc).saturating_sub(doc.spam_score.saturating_mul(2));

        metrics::counter!(telemetry::PAGES_PROCESSED).increment(1);
        Ok(())
    }
}

/// Collapse whitespace and normalize every URL on the record. The primary
/// URL must normalize; canonical and link URLs are dropped silently when
/// they do not.
fn clean_and_normalize(page: &mut PageData, doc: &mut Document) -> Result<(), PipelineError> {
    doc.visible_text = collapse_whitespace(&page.visible_text);

    page.url = normalize_url(&page.url)?;
    if let Ok(canonical) = normalize_url(&page.canonical_url) {
        page.canonical_url = canonical;
    }
    page.internal_links = normalize_links(&page.internal_links);
    page.external_links = normalize_links(&page.external_links);

    Ok(())
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim, validate and normalize a URL: scheme-relative `//host/...` is
/// promoted to https, scheme and host are lowercased, the rest is preserved
/// as parsed. Relative URLs have no base here and are rejected.
pub fn normalize_url(raw: &str) -> Result<String, PipelineError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PipelineError::InvalidUrl {
            url: raw.to_string(),
            reason: "empty URL".to_string(),
        });
    }

    if !raw.contains("://") && !raw.starts_with("//") {
        return Err(PipelineError::InvalidUrl {
            url: raw.to_string(),
            reason: "relative URL without base".to_string(),
        });
    }

    let candidate = if let Some(rest) = raw.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        raw.to_string()
    };

    // Url::parse lowercases the scheme and host on its own.
    let parsed = Url::parse(&candidate).map_err(|err| PipelineError::InvalidUrl {
        url: raw.to_string(),
        reason: err.to_string(),
    })?;

    Ok(parsed.to_string())
}

fn normalize_links(links: &[String]) -> Vec<String> {
    links
        .iter()
        .filter_map(|link| normalize_url(link).ok())
        .collect()
}
