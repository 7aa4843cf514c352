//! Shared fixtures for the Porter and decryption integration tests
#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::json;
use taco::chain::Address;
use taco::porter::{DecryptionRequestBody, DecryptionResponse, PorterResponse};
use taco::prelude::*;
use taco::testkit::{MemoryChain, TestRitual};
use tokio::net::TcpListener;
use url::Url;

/// Ordered record of which fake endpoint served which request
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("taco=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

/// An address nothing listens on
pub async fn dead_endpoint() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{}", addr)).unwrap()
}

/// An endpoint answering every request with the same status and body
pub async fn stub_endpoint(
    label: &'static str,
    status: StatusCode,
    body: serde_json::Value,
    log: CallLog,
) -> Url {
    let router = Router::new().fallback(move || {
        let log = log.clone();
        let body = body.clone();
        async move {
            log.record(label);
            (status, Json(body))
        }
    });
    serve(router).await
}

/// An endpoint that sends a 500 status line, then hangs up partway through the body
pub async fn truncated_endpoint() -> Url {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = stream
                .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial")
                .await;
            let _ = stream.shutdown().await;
        }
    });
    Url::parse(&format!("http://{}", addr)).unwrap()
}

/// An endpoint that never answers within any reasonable deadline
pub async fn stalled_endpoint() -> Url {
    let router = Router::new().fallback(|| async {
        tokio::time::sleep(Duration::from_secs(60)).await;
        StatusCode::OK
    });
    serve(router).await
}

pub fn peers_body(addresses: &[Address]) -> serde_json::Value {
    let ursulas: Vec<_> = addresses
        .iter()
        .map(|address| {
            json!({
                "encrypting_key": "02".to_string() + &"ab".repeat(32),
                "uri": "https://node.example:9151",
                "checksum_address": address.to_checksum(),
            })
        })
        .collect();
    json!({"result": {"ursulas": ursulas}, "version": "test"})
}

#[derive(Clone)]
struct PorterState {
    ritual: Arc<TestRitual>,
    failing: Arc<BTreeSet<Address>>,
    log: CallLog,
}

async fn handle_decrypt(
    State(state): State<PorterState>,
    Json(body): Json<DecryptionRequestBody>,
) -> Response {
    state.log.record("decrypt");
    match state.ritual.respond(&body, &state.failing) {
        Ok(results) => Json(PorterResponse {
            result: DecryptionResponse {
                decryption_results: results,
            },
            version: "test".to_string(),
        })
        .into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

async fn handle_peers(State(state): State<PorterState>) -> Json<serde_json::Value> {
    state.log.record("get_ursulas");
    Json(peers_body(&state.ritual.addresses()))
}

/// A Porter in front of `ritual`'s nodes; nodes in `failing` refuse to share
pub async fn fake_porter(ritual: Arc<TestRitual>, failing: BTreeSet<Address>, log: CallLog) -> Url {
    let state = PorterState {
        ritual,
        failing: Arc::new(failing),
        log,
    };
    let router = Router::new()
        .route("/decrypt", post(handle_decrypt))
        .route("/get_ursulas", get(handle_peers))
        .with_state(state);
    serve(router).await
}

/// A ritual registered on an in-memory coordinator
pub fn setup_ritual(id: u32, threshold: u32, shares: u32) -> (Arc<TestRitual>, Arc<MemoryChain>) {
    let ritual = Arc::new(TestRitual::new(id, threshold, shares).unwrap());
    let chain = Arc::new(MemoryChain::new(Domain::Lynx.chain_id()));
    chain.add_ritual(ritual.ritual());
    (ritual, chain)
}

pub fn decryptor(chain: Arc<MemoryChain>, porter_uris: Vec<Url>) -> ThresholdDecryptor {
    ThresholdDecryptor::new(
        RitualResolver::new(chain),
        PorterClient::new(porter_uris, Duration::from_secs(5)).unwrap(),
    )
    .with_domain(Domain::Lynx)
}
