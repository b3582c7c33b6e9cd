//! Upload workflow driven end to end through the HTTP client and the real server.
//!
//! Run with: cargo test --test workflow_http

mod common;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::{Json, Router};
use common::{endpoint, scratch_dir, shared, spawn_server, write_reference, MockProvider, Reply};
use lookalike::client::{HttpTransformClient, TransformClient};
use lookalike::upload::MAX_UPLOAD_BYTES;
use lookalike::workflow::{UploadWorkflow, WorkflowState};

#[tokio::test]
async fn jpeg_upload_to_download() {
    let dir = scratch_dir("wf-happy");
    let png = vec![0x89, b'P', b'N', b'G', 42, 42];
    let provider = MockProvider::png(png.clone());
    let addr = spawn_server(shared(&provider), write_reference(&dir)).await;
    let client = HttpTransformClient::new(endpoint(addr), None).unwrap();

    let upload = vec![0xab; 5 * 1024 * 1024];
    let mut wf = UploadWorkflow::new();
    wf.stage_bytes(upload.clone(), "image/jpeg").unwrap();
    assert_eq!(wf.state(), WorkflowState::Ready);
    assert_eq!(provider.calls(), 0);

    assert!(wf.transform(&client).await);
    assert_eq!(wf.state(), WorkflowState::Done);
    assert_eq!(wf.result().unwrap().bytes, png);
    assert_eq!(provider.requests()[0].images[1].bytes, upload);

    let now = chrono::Utc::now();
    let path = wf.download_to(&dir, now).unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(name, format!("cz-style-{}.png", now.timestamp_millis()));
    assert!(name.starts_with("cz-style-") && name.ends_with(".png"));
    assert_eq!(std::fs::read(&path).unwrap(), wf.result().unwrap().bytes);

    // Downloading does not change state
    assert_eq!(wf.state(), WorkflowState::Done);
}

#[tokio::test]
async fn oversized_upload_never_leaves_empty() {
    let mut wf = UploadWorkflow::new();
    assert!(wf.stage_bytes(vec![0; 25 * 1024 * 1024], "image/png").is_err());
    assert_eq!(wf.state(), WorkflowState::Empty);

    // Exactly at the limit is fine
    wf.stage_bytes(vec![0; MAX_UPLOAD_BYTES], "image/png").unwrap();
    assert_eq!(wf.state(), WorkflowState::Ready);
}

#[tokio::test]
async fn provider_failure_keeps_upload_for_retry() {
    let dir = scratch_dir("wf-retry");
    let provider = MockProvider::new(vec![
        Reply::Upstream {
            status: 503,
            message: "Model overloaded".to_string(),
            details: serde_json::json!({"error": {"message": "Model overloaded"}}),
        },
        Reply::Png(vec![9, 9]),
    ]);
    let addr = spawn_server(shared(&provider), write_reference(&dir)).await;
    let client = HttpTransformClient::new(endpoint(addr), None).unwrap();

    let upload = vec![1, 2, 3, 4];
    let mut wf = UploadWorkflow::new();
    wf.stage_bytes(upload.clone(), "image/png").unwrap();

    wf.transform(&client).await;
    assert_eq!(wf.state(), WorkflowState::Error);
    assert_eq!(wf.error_message(), Some("Model overloaded"));
    assert_eq!(wf.staged().unwrap().bytes(), upload.as_slice());
    assert!(wf.result().is_none());

    wf.transform(&client).await;
    assert_eq!(wf.state(), WorkflowState::Done);
    assert_eq!(wf.result().unwrap().bytes, vec![9, 9]);

    let sent: Vec<Vec<u8>> = provider.requests().iter().map(|r| r.images[1].bytes.clone()).collect();
    assert_eq!(sent, vec![upload.clone(), upload]);
}

#[tokio::test]
async fn response_after_reset_is_discarded() {
    let dir = scratch_dir("wf-stale");
    let provider = MockProvider::png(vec![5]);
    let addr = spawn_server(shared(&provider), write_reference(&dir)).await;
    let client = HttpTransformClient::new(endpoint(addr), None).unwrap();

    let mut wf = UploadWorkflow::new();
    wf.stage_bytes(vec![1, 2, 3], "image/webp").unwrap();
    let ticket = wf.begin_transform().unwrap();
    assert_eq!(wf.state(), WorkflowState::Processing);

    wf.reset();
    let outcome = client.transform(ticket.image(), &ticket.file_name()).await;
    assert!(outcome.is_ok());
    assert!(!wf.complete(ticket, outcome));
    assert_eq!(wf.state(), WorkflowState::Empty);
    assert!(wf.result().is_none());
}

#[tokio::test]
async fn unreachable_endpoint_is_an_error_state() {
    // Bind then drop to get a port nothing listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = HttpTransformClient::new(endpoint(addr), Some(std::time::Duration::from_secs(5))).unwrap();
    let mut wf = UploadWorkflow::new();
    wf.stage_bytes(vec![1], "image/jpeg").unwrap();
    wf.transform(&client).await;
    assert_eq!(wf.state(), WorkflowState::Error);
    assert!(wf.error_message().unwrap().starts_with("network error"));
    assert!(wf.staged().is_some());
}

#[tokio::test]
async fn hosted_result_is_fetched_before_done() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let hosted = vec![0x89, b'P', b'N', b'G', 11];
    let served = hosted.clone();
    let app = Router::new()
        .route(
            "/api/transform",
            post(move || async move {
                Json(serde_json::json!({
                    "transformedImage": format!("http://{}/files/out.png", addr),
                    "message": "Image transformed successfully",
                }))
            }),
        )
        .route(
            "/files/out.png",
            get(move || {
                let bytes = served.clone();
                async move { bytes }
            }),
        );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = HttpTransformClient::new(endpoint(addr), None).unwrap();
    let mut wf = UploadWorkflow::new();
    wf.stage_bytes(vec![1, 2], "image/png").unwrap();
    wf.transform(&client).await;

    assert_eq!(wf.state(), WorkflowState::Done);
    assert_eq!(wf.result().unwrap().bytes, hosted);
}
