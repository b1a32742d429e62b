use async_trait::async_trait;
use crawlsink::models::{Document, PageData};
use crawlsink::pipeline::{PipelineError, Processor};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// A recorder handle that is not installed globally, so test crates don't
/// fight over the process-wide recorder slot.
pub fn prometheus_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

pub fn page(url: &str, text: &str) -> PageData {
    PageData {
        url: url.to_string(),
        visible_text: text.to_string(),
        ..PageData::default()
    }
}

/// Processor that just carries the URL over; lets HTTP-level tests avoid
/// loading language models.
pub struct PassthroughProcessor;

#[async_trait]
impl Processor for PassthroughProcessor {
    async fn process(
        &self,
        page: &mut PageData,
        doc: &mut Document,
    ) -> Result<(), PipelineError> {
        doc.url = page.url.clone();
        Ok(())
    }
}
