use crawlsink::indexer::BulkIndexer;
use crawlsink::models::Document;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn doc(url: &str) -> Document {
    Document {
        url: url.to_string(),
        ..Document::default()
    }
}

async fn wait_for_requests(server: &MockServer, count: usize, budget: Duration) -> Vec<wiremock::Request> {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
        let requests = server.received_requests().await.unwrap_or_default();
        if requests.len() >= count {
            return requests;
        }
        if tokio::time::Instant::now() > deadline {
            panic!(
                "expected {count} requests, saw {} within {budget:?}",
                requests.len()
            );
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn threshold_triggers_a_flush_before_the_interval() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("Content-Type", "application/x-ndjson"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let indexer = BulkIndexer::new(
        2,
        Duration::from_secs(3600),
        0,
        format!("{}/_bulk", server.uri()),
        "test_index".to_string(),
    );

    indexer.add_document(doc("https://ex.com/a"));
    indexer.add_document(doc("https://ex.com/b"));

    let requests = wait_for_requests(&server, 1, Duration::from_secs(5)).await;
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    let lines: Vec<&str> = body.lines().filter(|l| !l.is_empty()).collect();
    assert_eq!(lines.len(), 4);

    // Insertion order is preserved within the payload.
    let first_meta: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first_meta["index"]["_index"], "test_index");
    assert_eq!(first_meta["index"]["_id"], "ex.com_a");
    let second_meta: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
    assert_eq!(second_meta["index"]["_id"], "ex.com_b");

    indexer.stop().await;
}

#[tokio::test]
async fn stop_flushes_whatever_is_buffered() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let indexer = BulkIndexer::new(
        10,
        Duration::from_secs(3600),
        0,
        format!("{}/_bulk", server.uri()),
        "test_index".to_string(),
    );

    indexer.add_document(doc("https://ex.com/only"));
    // Below threshold, interval far away: only stop can flush this.
    indexer.stop().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(body.contains("ex.com_only"));
}

#[tokio::test]
async fn stop_with_an_empty_buffer_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let indexer = BulkIndexer::new(
        10,
        Duration::from_secs(3600),
        0,
        format!("{}/_bulk", server.uri()),
        "test_index".to_string(),
    );
    indexer.stop().await;

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_request_is_retried_until_success() {
    let server = MockServer::start().await;
    // First attempt is rejected, the retry succeeds.
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let indexer = BulkIndexer::new(
        1,
        Duration::from_secs(3600),
        3,
        format!("{}/_bulk", server.uri()),
        "test_index".to_string(),
    );
    indexer.add_document(doc("https://ex.com/retry"));

    // stop waits out the in-flight request, backoff sleep included.
    indexer.stop().await;

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    // Retries resend the identical payload; ids make this idempotent.
    assert_eq!(requests[0].body, requests[1].body);
}

#[tokio::test]
async fn retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let indexer = BulkIndexer::new(
        1,
        Duration::from_secs(3600),
        1,
        format!("{}/_bulk", server.uri()),
        "test_index".to_string(),
    );
    indexer.add_document(doc("https://ex.com/doomed"));
    indexer.stop().await;

    // max_retries = 1 means exactly two attempts, then the document is
    // counted as a bulk failure and dropped.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}
