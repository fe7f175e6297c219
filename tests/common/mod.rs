//! Scriptable mock collection endpoint shared by the integration tests.

#![allow(dead_code)]

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use gaze_sample_agent::sample::{Goal, Identity, Sample, EYE_CROP_LEN, POINTS_LEN};
use gaze_sample_agent::uploader::{RetryPolicy, StatusRx, UploadStatus};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How the mock answers one request.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Answer with this status; 2xx replies carry a JSON body
    Status(u16),
    /// 200 with a plain-text body
    NotJson,
    /// Sleep before answering 200
    Hang(Duration),
}

/// One request seen by the mock.
#[derive(Debug, Clone)]
pub struct Received {
    pub at: Instant,
    pub field: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Default)]
struct MockState {
    script: Mutex<VecDeque<Reply>>,
    received: Mutex<Vec<Received>>,
}

/// Handle to a running mock endpoint.
#[derive(Clone)]
pub struct MockEndpoint {
    pub addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockEndpoint {
    /// Start a mock answering from `script`, then 200 forever.
    pub async fn start(script: Vec<Reply>) -> Self {
        let state = Arc::new(MockState {
            script: Mutex::new(script.into()),
            received: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/samples", post(upload))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock endpoint");
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/samples", self.addr)
    }

    pub fn received(&self) -> Vec<Received> {
        self.state.received.lock().unwrap().clone()
    }

    /// Wait until at least `count` requests have arrived.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<Received> {
        let deadline = Instant::now() + timeout;
        loop {
            let received = self.received();
            if received.len() >= count || Instant::now() >= deadline {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

async fn upload(State(state): State<Arc<MockState>>, mut multipart: Multipart) -> Response {
    let mut received = Received {
        at: Instant::now(),
        field: None,
        file_name: None,
        content_type: None,
        body: Vec::new(),
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        received.field = field.name().map(str::to_string);
        received.file_name = field.file_name().map(str::to_string);
        received.content_type = field.content_type().map(str::to_string);
        received.body = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
    }

    state.received.lock().unwrap().push(received);
    let reply = state
        .script
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or(Reply::Status(200));

    match reply {
        Reply::Status(code) => {
            let status = StatusCode::from_u16(code).unwrap();
            if status.is_success() {
                (status, Json(serde_json::json!({ "status": "ok" }))).into_response()
            } else {
                (status, format!("scripted failure {code}")).into_response()
            }
        }
        Reply::NotJson => (StatusCode::OK, "ok").into_response(),
        Reply::Hang(delay) => {
            tokio::time::sleep(delay).await;
            Json(serde_json::json!({ "status": "ok" })).into_response()
        }
    }
}

/// Retry policy with delays short enough for tests.
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        forbidden_delay: Duration::from_millis(150),
        max_requeues: None,
    }
}

/// Next status message, failing the test after five seconds.
pub async fn next_status(rx: &mut StatusRx) -> UploadStatus {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for upload status")
        .expect("status channel closed")
}

/// Skip statuses until one matches `pred`.
pub async fn status_matching<F>(rx: &mut StatusRx, mut pred: F) -> UploadStatus
where
    F: FnMut(&UploadStatus) -> bool,
{
    loop {
        let status = next_status(rx).await;
        if pred(&status) {
            return status;
        }
    }
}

pub fn identity() -> Identity {
    Identity::new(
        "3f2b8c1e-9a4d-4e6f-8b2a-1c5d7e9f0a11",
        "7c9e1a3b-5d2f-4a8e-9c1b-2e4f6a8b0c22",
        "1a2b3c4d-5e6f-4a1b-8c2d-3e4f5a6b7c33",
        "9f8e7d6c-5b4a-4f3e-8d2c-1b0a9f8e7d44",
        "0a1b2c3d-4e5f-4a6b-9c7d-8e9f0a1b2c55",
    )
}

pub fn sample(time: u64) -> Sample {
    Sample::new(
        time,
        identity(),
        vec![0.25; POINTS_LEN],
        Some(Goal::new(0.5, -1.0)),
    )
    .unwrap()
    .with_eyes(Some(vec![7; EYE_CROP_LEN]), None)
}
