//! Document enrichment and quality scoring.
//!
//! The enricher carries page fields over to the document and asks the NLP
//! service for entities, keyphrases and a summary. NLP trouble is never
//! fatal: the document proceeds unenriched and the page still gets indexed.

use crate::models::{Document, PageData};
use crate::nlp::NlpClient;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Upper bound on one enrichment round trip, batching delays included.
const ENRICH_TIMEOUT: Duration = Duration::from_secs(10);

/// Augments a document with NLP-derived metadata.
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, page: &PageData, doc: &mut Document) -> anyhow::Result<()>;
}

/// Enricher backed by the batching NLP client.
pub struct NlpEnricher {
    nlp: Arc<NlpClient>,
}

impl NlpEnricher {
    pub fn new(nlp: Arc<NlpClient>) -> Self {
        Self { nlp }
    }
}

#[async_trait]
impl Enricher for NlpEnricher {
    async fn enrich(&self, page: &PageData, doc: &mut Document) -> anyhow::Result<()> {
        // Field carry-over happens before any early return so the document
        // is indexable even when the NLP path is skipped entirely.
        copy_page_fields(page, doc);

        if page.visible_text.is_empty() {
            return Ok(());
        }

        let outcome =
            match tokio::time::timeout(ENRICH_TIMEOUT, self.nlp.process(&doc.visible_text)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    warn!(url = %page.url, error = %err, "NLP enrichment failed, continuing unenriched");
                    return Ok(());
                }
                Err(_) => {
                    warn!(url = %page.url, "NLP enrichment timed out, continuing unenriched");
                    return Ok(());
                }
            };

        doc.entities = outcome
            .entities
            .iter()
            .map(|entity| format!("{}: {}", entity.label, entity.text))
            .collect();
        doc.keywords = outcome.keyphrases;
        doc.summary = outcome.summary;

        Ok(())
    }
}

/// Enricher that only carries fields over; used where the NLP service is out
/// of the picture.
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich(&self, page: &PageData, doc: &mut Document) -> anyhow::Result<()> {
        copy_page_fields(page, doc);
        Ok(())
    }
}

fn copy_page_fields(page: &PageData, doc: &mut Document) {
    doc.url = page.url.clone();
    doc.canonical_url = page.canonical_url.clone();
    doc.title = page.title.clone();
    doc.meta_description = page.meta_description.clone();
    doc.language = page.language.clone();
    doc.internal_links = page.internal_links.clone();
    doc.external_links = page.external_links.clone();
    doc.date_published = page.date_published;
    doc.date_modified = page.date_modified;
    doc.social_links = page.social_links.clone();
    doc.is_secure = page.is_secure;
    if !page.load_time.is_zero() {
        doc.load_time = page.load_time.as_millis() as i64;
    }
    doc.last_crawled = Some(Utc::now());
}

/// Additive structural quality score, capped at 100.
pub fn quality_score(doc: &Document) -> u32 {
    let mut score = 0u32;

    if doc.visible_text.len() > 100 {
        score += 10;
    }
    if doc.title.len() > 5 && doc.title.len() < 150 {
        score += 10;
    }
    if doc.meta_description.len() > 50 {
        score += 5;
    }
    if !doc.entities.is_empty() {
        score += 10;
    }
    if doc.keywords.len() > 3 {
        score += 10;
    }
    if !doc.internal_links.is_empty() {
        score += 5;
    }
    if !doc.external_links.is_empty() {
        score += 5;
    }
    if doc.language == "en" {
        score += 10;
    }
    if doc.is_secure {
        score += 25;
    }
    if doc.load_time < 1000 {
        score += 10;
    } else if doc.load_time < 2000 {
        score += 5;
    } else if doc.load_time < 3000 {
        score += 2;
    }

    score.min(100)
}
