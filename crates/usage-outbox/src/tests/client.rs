//! Retry loop behaviour of the delivery client.

use super::harness::{fast_client_config, LogCapture, ScriptedTransport, TEST_TOKEN};
use crate::client::{AttemptFailure, DeliveryClient};
use crate::transport::HttpResponse;
use crate::{DeliveryError, TransportError};
use serde_json::json;
use std::time::{Duration, Instant};

#[tokio::test]
async fn success_on_first_attempt() {
    let transport = ScriptedTransport::new();
    transport.push_status(200);
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    let response = client.post("/usage", &json!({"k": 1})).await.unwrap();
    assert_eq!(response.status, 200);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url, "https://metering.test/api/usage");
    assert_eq!(requests[0].bearer_token, TEST_TOKEN);
    assert_eq!(requests[0].body, json!({"k": 1}));
}

#[tokio::test]
async fn conflict_resolves_without_retry() {
    let transport = ScriptedTransport::new();
    transport.push_status(409);
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    assert_eq!(client.post("/usage", &json!({})).await.unwrap().status, 409);
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn retryable_then_success() {
    let transport = ScriptedTransport::new();
    transport.push_status(503);
    transport.push(Err(TransportError::Timeout));
    transport.push_status(429);
    transport.push_status(201);
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    assert_eq!(client.post("/usage", &json!({})).await.unwrap().status, 201);
    assert_eq!(transport.request_count(), 4);
}

#[tokio::test]
async fn exhaustion_reports_retry_count_and_last_failure() {
    let transport = ScriptedTransport::new();
    transport.push_statuses(500, 3);
    transport.push(Ok(HttpResponse::new(502).with_body("bad gateway")));
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    let err = client.post("/usage", &json!({})).await.unwrap_err();
    match err {
        DeliveryError::RetriesExhausted { retries, last } => {
            assert_eq!(retries, 3);
            assert_eq!(
                last,
                AttemptFailure::Status {
                    status: 502,
                    body: "bad gateway".into()
                }
            );
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
    assert_eq!(transport.request_count(), 4);
}

#[tokio::test]
async fn zero_retries_means_single_attempt() {
    let transport = ScriptedTransport::new();
    transport.push_status(500);
    let client = DeliveryClient::new(fast_client_config(0), transport.clone());

    let err = client.post("/usage", &json!({})).await.unwrap_err();
    assert!(matches!(err, DeliveryError::RetriesExhausted { retries: 0, .. }));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn non_retryable_fails_immediately() {
    for status in [400, 401, 403, 404, 422] {
        let transport = ScriptedTransport::new();
        transport.push(Ok(HttpResponse::new(status).with_body("nope")));
        let client = DeliveryClient::new(fast_client_config(3), transport.clone());

        let err = client.post("/usage", &json!({})).await.unwrap_err();
        match err {
            DeliveryError::Rejected { status: got, body } => {
                assert_eq!(got, status);
                assert_eq!(body, "nope");
            }
            other => panic!("expected Rejected for {status}, got {other:?}"),
        }
        assert_eq!(transport.request_count(), 1, "status {status}");
    }
}

#[tokio::test]
async fn rejection_body_is_truncated() {
    let transport = ScriptedTransport::new();
    transport.push(Ok(HttpResponse::new(400).with_body("x".repeat(2000))));
    let client = DeliveryClient::new(fast_client_config(3), transport);

    match client.post("/usage", &json!({})).await.unwrap_err() {
        DeliveryError::Rejected { body, .. } => assert_eq!(body.len(), 512),
        other => panic!("expected Rejected, got {other:?}"),
    }
}

#[tokio::test]
async fn retry_after_overrides_backoff_cap() {
    let transport = ScriptedTransport::new();
    transport.push(Ok(
        HttpResponse::new(429).with_retry_after(Duration::from_millis(60))
    ));
    transport.push_status(200);
    // Computed backoff is capped at 5ms; the server asks for 60ms.
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    let started = Instant::now();
    client.post("/usage", &json!({})).await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(transport.request_count(), 2);
}

#[tokio::test]
async fn post_once_never_retries() {
    let transport = ScriptedTransport::new();
    transport.push_status(503);
    transport.push_status(200);
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    let err = client.post_once("/usage", &json!({})).await.unwrap_err();
    assert!(matches!(err, DeliveryError::RetriesExhausted { retries: 0, .. }));
    assert_eq!(transport.request_count(), 1);
}

#[tokio::test]
async fn token_is_masked_in_every_log_line() {
    let capture = LogCapture::default();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let transport = ScriptedTransport::new();
    transport.push_status(503);
    transport.push(Ok(HttpResponse::new(401).with_body("bad credentials")));
    let client = DeliveryClient::new(fast_client_config(3), transport.clone());

    let err = client.post("/usage", &json!({"k": 1})).await.unwrap_err();
    assert!(matches!(err, DeliveryError::Rejected { status: 401, .. }));
    assert_eq!(transport.request_count(), 2);

    let logs = capture.contents();
    assert!(logs.contains("Sending delivery request"), "{logs}");
    assert!(logs.contains("Delivery attempt failed, retrying"), "{logs}");
    assert!(logs.contains("Delivery rejected"), "{logs}");
    assert!(logs.contains("Bearer tok_***"), "{logs}");
    assert!(!logs.contains(TEST_TOKEN), "token leaked: {logs}");
}
