//! Integration tests for Porter endpoint fallback

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::CallLog;
use serde_json::json;
use taco::cancel::Cancellation;
use taco::chain::Address;
use taco::porter::{PorterClient, PorterError};

fn client(uris: Vec<url::Url>) -> PorterClient {
    PorterClient::new(uris, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_falls_back_in_order_until_success() {
    common::init_tracing();
    let log = CallLog::default();
    let peer = Address::from([7; 20]);

    let dead = common::dead_endpoint().await;
    let rejecting = common::stub_endpoint(
        "rejecting",
        StatusCode::BAD_REQUEST,
        json!({"error": "bad request"}),
        log.clone(),
    )
    .await;
    let healthy = common::stub_endpoint(
        "healthy",
        StatusCode::OK,
        common::peers_body(&[peer]),
        log.clone(),
    )
    .await;

    let porter = client(vec![dead, rejecting, healthy]);
    let peers = porter
        .get_peers(1, &[], &[], &Cancellation::none())
        .await
        .unwrap();

    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].checksum_address, peer);
    assert_eq!(log.entries(), vec!["rejecting", "healthy"]);
}

#[tokio::test]
async fn test_first_success_stops_fallback() {
    let log = CallLog::default();
    let first = common::stub_endpoint("first", StatusCode::OK, common::peers_body(&[]), log.clone()).await;
    let second = common::stub_endpoint("second", StatusCode::OK, common::peers_body(&[]), log.clone()).await;

    let porter = client(vec![first, second]);
    porter
        .get_peers(0, &[], &[], &Cancellation::none())
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["first"]);
}

#[tokio::test]
async fn test_last_error_is_reported() {
    let log = CallLog::default();
    let rejecting = common::stub_endpoint(
        "rejecting",
        StatusCode::BAD_REQUEST,
        json!({"error": "bad request"}),
        log.clone(),
    )
    .await;
    let dead = common::dead_endpoint().await;

    let porter = client(vec![rejecting, dead.clone()]);
    let error = porter
        .get_peers(1, &[], &[], &Cancellation::none())
        .await
        .unwrap_err();

    match error {
        PorterError::Transport { uri, .. } => assert_eq!(uri, dead),
        other => panic!("expected transport error from the last endpoint, got {:?}", other),
    }
    assert_eq!(log.entries(), vec!["rejecting"]);
}

#[tokio::test]
async fn test_undecodable_body_counts_as_failure() {
    let log = CallLog::default();
    let garbled = common::stub_endpoint("garbled", StatusCode::OK, json!({"unexpected": true}), log.clone()).await;
    let rejecting = common::stub_endpoint(
        "rejecting",
        StatusCode::INTERNAL_SERVER_ERROR,
        json!("boom"),
        log.clone(),
    )
    .await;

    let porter = client(vec![garbled, rejecting]);
    let error = porter
        .get_peers(1, &[], &[], &Cancellation::none())
        .await
        .unwrap_err();

    assert!(matches!(
        error,
        PorterError::BadResponse { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR
    ));
    assert_eq!(log.entries(), vec!["garbled", "rejecting"]);
}

#[tokio::test]
async fn test_unreadable_error_body_is_recorded() {
    let truncated = common::truncated_endpoint().await;
    let porter = client(vec![truncated]);

    let error = porter
        .get_peers(1, &[], &[], &Cancellation::none())
        .await
        .unwrap_err();
    match error {
        PorterError::BadResponse { status, body, .. } => {
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(body.starts_with("<unreadable body:"), "body was {:?}", body);
        }
        other => panic!("expected a bad response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deadline_interrupts_stalled_endpoint() {
    let stalled = common::stalled_endpoint().await;
    let porter = client(vec![stalled]);

    let cancel = Cancellation::none().with_timeout(Duration::from_millis(100));
    let error = porter.get_peers(1, &[], &[], &cancel).await.unwrap_err();
    assert!(matches!(
        error,
        PorterError::Interrupted(taco::cancel::Interrupted::DeadlineExceeded)
    ));
}

#[test]
fn test_invalid_uris_rejected() {
    assert!(matches!(
        PorterClient::from_uris(["ftp://porter.example"]),
        Err(PorterError::InvalidUri { .. })
    ));
    assert!(matches!(
        PorterClient::from_uris(Vec::<String>::new()),
        Err(PorterError::NoEndpoints)
    ));
}
