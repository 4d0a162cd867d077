//! Stand-in for the Flask backend's `/get-sar-image` route.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

#[derive(Clone, Debug)]
pub struct MockReply {
    pub status: StatusCode,
    pub body: Value,
    pub delay: Duration,
}

impl MockReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub body: Value,
    pub content_type: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Clone)]
pub struct MockBackend {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    reply: Arc<Mutex<MockReply>>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn set_reply(&self, reply: MockReply) {
        *self.reply.lock().expect("reply lock") = reply;
    }
}

pub struct MockServer {
    pub base_url: String,
    pub backend: MockBackend,
    _shutdown: oneshot::Sender<()>,
}

async fn get_sar_image(
    State(backend): State<MockBackend>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    };
    backend
        .requests
        .lock()
        .expect("requests lock")
        .push(RecordedRequest {
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
            content_type: header("content-type"),
            request_id: header("x-request-id"),
        });

    let reply = backend.reply.lock().expect("reply lock").clone();
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (reply.status, Json(reply.body))
}

pub async fn spawn_mock_backend(reply: MockReply) -> MockServer {
    let backend = MockBackend {
        requests: Arc::default(),
        reply: Arc::new(Mutex::new(reply)),
    };
    let app = Router::new()
        .route("/get-sar-image", post(get_sar_image))
        .with_state(backend.clone());

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend listener");
    let address: SocketAddr = listener.local_addr().expect("mock listener local addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });
        server.await.expect("run mock backend");
    });

    MockServer {
        base_url: format!("http://{address}"),
        backend,
        _shutdown: shutdown_tx,
    }
}

/// An address nothing listens on.
pub async fn unused_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let address = listener.local_addr().expect("throwaway local addr");
    drop(listener);
    format!("http://{address}")
}
