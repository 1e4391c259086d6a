//! HTTP invocation channel tests against a mock server

use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use hrmigrate_server::migration::{
    BatchInvoker, BatchRequest, DispatchConfig, Dispatcher, HttpInvoker, Record,
};
use hrmigrate_server::storage::MemoryStore;

mod helpers;
use helpers::{batch, job, BUCKET};

fn request(batch_id: u32) -> BatchRequest {
    BatchRequest::new(
        BUCKET,
        "data/jobs.csv",
        "jobs",
        batch(batch_id, vec![job(1, "Engineer"), job(2, "Analyst")]),
    )
}

#[tokio::test]
async fn test_posts_batch_as_json() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/batches"))
        .and(body_partial_json(json!({
            "bucket": BUCKET,
            "table": "jobs",
            "batch_id": 4,
            "rows": [["1", "Engineer"], ["2", "Analyst"]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batch_id": 4,
            "status": "Passed",
            "detail": { "kind": "loaded", "affected_rows": 2 }
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let invoker = HttpInvoker::new(&mock_server.uri()).unwrap();
    let response = invoker.invoke(request(4)).await;

    assert_eq!(response.status, 200);
    assert!(response.body.contains("\"affected_rows\":2"));
}

#[tokio::test]
async fn test_server_error_is_passed_through() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/batches"))
        .respond_with(ResponseTemplate::new(500).set_body_string("artifact write failed"))
        .mount(&mock_server)
        .await;

    let invoker = HttpInvoker::new(&mock_server.uri()).unwrap();
    let response = invoker.invoke(request(1)).await;

    assert_eq!(response.status, 500);
    assert_eq!(response.body, "artifact write failed");
}

#[tokio::test]
async fn test_dispatch_over_http_audits_every_batch() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/batches"))
        .and(body_partial_json(json!({ "batch_id": 2 })))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .with_priority(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/batches"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "batch_id": 0,
            "status": "Passed",
            "detail": { "kind": "loaded", "affected_rows": 2 }
        })))
        .with_priority(2)
        .mount(&mock_server)
        .await;

    let store = MemoryStore::new();
    let dispatcher = Dispatcher::new(
        Arc::new(HttpInvoker::new(&mock_server.uri()).unwrap()),
        Arc::new(store.clone()),
        DispatchConfig {
            batch_size: 2,
            concurrency: 2,
            ..Default::default()
        },
    );

    let rows: Vec<Record> = (1..=5).map(|i| job(i, "x")).collect();
    let report = dispatcher
        .dispatch(BUCKET, "data/jobs.csv", "jobs", rows)
        .await
        .unwrap();

    let statuses: Vec<u16> = report.entries.iter().map(|e| e.invocation_status).collect();
    assert_eq!(statuses, vec![200, 503, 200]);
    assert_eq!(report.entries[2].batch_size, 1);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(store.keys(BUCKET), vec![report.audit_artifact.key.clone()]);
}
