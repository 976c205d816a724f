//! Status client tests against a mock HTTP server.

use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use vproc_models::{DeliveryAttempt, EncodeResult, ErrorCode, JobDescriptor, JobId};
use vproc_status::{
    CompletionReport, FailureReport, StatusClient, StatusClientConfig, StatusError, StatusReporter,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> StatusClient {
    StatusClient::new(StatusClientConfig {
        base_url: server.uri(),
        timeout: Duration::from_millis(500),
        worker_id: "worker-test".to_string(),
    })
    .expect("client")
}

fn failure_report(retry_count: u32) -> FailureReport {
    FailureReport {
        job_id: JobId::from("v1"),
        reason: "ffmpeg exited with status 1".to_string(),
        error_code: ErrorCode::EncodingFailed,
        retry_count,
        delivery_attempt: DeliveryAttempt(2),
        max_deliveries: 3,
        failed_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_mark_processing_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v1/processing"))
        .and(body_partial_json(json!({"worker_id": "worker-test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let advisory = client_for(&server)
        .mark_processing(&JobId::from("v1"), Utc::now())
        .await;
    assert!(advisory.is_ok());
}

#[tokio::test]
async fn test_mark_processing_failure_is_advisory() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v1/processing"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let advisory = client_for(&server)
        .mark_processing(&JobId::from("v1"), Utc::now())
        .await;
    assert!(!advisory.is_ok());
    assert!(advisory.failure().unwrap().contains("503"));
}

#[tokio::test]
async fn test_update_status_sends_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v2/status"))
        .and(body_partial_json(json!({
            "status": "done",
            "stream_path": "/hls/v2/playlist.m3u8",
            "thumbnail_path": "/thumbs/v2/thumbnail.jpg",
            "duration": 93,
            "worker_id": "worker-test"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "updated"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let report = CompletionReport::new(
        JobId::from("v2"),
        EncodeResult::new("/hls/v2/playlist.m3u8")
            .with_thumbnail("/thumbs/v2/thumbnail.jpg")
            .with_duration(93),
    );
    client_for(&server).update_status(&report).await.unwrap();
}

#[tokio::test]
async fn test_update_status_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v2/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "video not found"
        })))
        .mount(&server)
        .await;

    let report =
        CompletionReport::new(JobId::from("v2"), EncodeResult::new("/hls/v2/playlist.m3u8"));
    let err = client_for(&server).update_status(&report).await.unwrap_err();
    assert!(matches!(err, StatusError::Rejected(ref m) if m == "video not found"));
}

#[tokio::test]
async fn test_report_failure_returns_should_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v1/failure"))
        .and(body_partial_json(json!({
            "error_code": "ENCODING_FAILED",
            "retry_count": 1,
            "delivery_attempt": 2,
            "max_deliveries": 3
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "recorded",
            "should_retry": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let should_retry = client_for(&server)
        .report_failure(&failure_report(1))
        .await
        .unwrap();
    assert!(!should_retry);
}

#[tokio::test]
async fn test_report_failure_without_decision_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v1/failure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "message": "recorded"
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .report_failure(&failure_report(0))
        .await
        .unwrap_err();
    assert!(matches!(err, StatusError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_report_failure_timeout_is_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/v1/failure"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"success": true, "should_retry": true}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server)
        .report_failure(&failure_report(0))
        .await
        .unwrap_err();
    assert!(matches!(err, StatusError::Network(_)));
}

#[tokio::test]
async fn test_reserved_characters_stay_in_the_job_segment() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/clip%231/failure"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "should_retry": true
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/videos/a%3Fb/processing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(1)
        .mount(&server)
        .await;
    // Any other path means a job ID leaked into another job's endpoint.
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&server)
        .await;

    let job = JobDescriptor::decode(br#"{"video_id":"clip#1","upload_file_path":"c.mp4"}"#)
        .expect("job ID with '#' is a valid payload");
    let client = client_for(&server);

    let report = FailureReport {
        job_id: job.job_id,
        ..failure_report(0)
    };
    assert!(client.report_failure(&report).await.unwrap());

    let advisory = client.mark_processing(&JobId::from("a?b"), Utc::now()).await;
    assert!(advisory.is_ok());
}
