//! Test helpers: an in-process mock upstream API and child-process cleanup.

use anyhow::Context as _;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::process::Child;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Request header that makes the echo endpoint answer with a different status. A path of
/// the form `/status/<code>` does the same.
pub const STATUS_HEADER: &str = "x-mock-status";

pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// One request received by the echo endpoint.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    /// Lower-cased names; repeated headers joined with `, `.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    #[must_use]
    pub fn body_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

struct MockState {
    spec: Value,
    recorded: Mutex<Vec<RecordedRequest>>,
}

/// Serves an API document at `/openapi.json` and `/openapi.yaml`, and echoes every other
/// request back as JSON while recording it.
pub struct MockUpstream {
    base_url: String,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockUpstream {
    /// Bind an ephemeral localhost port and start serving. `spec` receives the base URL so
    /// the document can point its `servers` back at the mock.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound.
    pub async fn start(spec: impl FnOnce(&str) -> Value) -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock upstream")?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let state = Arc::new(MockState {
            spec: spec(&base_url),
            recorded: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/openapi.json", get(spec_json))
            .route("/openapi.yaml", get(spec_yaml))
            .fallback(echo)
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        });
        let handle = tokio::spawn(async move {
            let _ = server.await;
        });

        Ok(Self {
            base_url,
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn spec_url(&self) -> String {
        format!("{}/openapi.json", self.base_url)
    }

    #[must_use]
    pub fn yaml_spec_url(&self) -> String {
        format!("{}/openapi.yaml", self.base_url)
    }

    /// Requests seen by the echo endpoint (document fetches are not recorded).
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.recorded.lock().clone()
    }

    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.recorded.lock().len()
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn spec_json(State(state): State<Arc<MockState>>) -> axum::Json<Value> {
    axum::Json(state.spec.clone())
}

async fn spec_yaml(State(state): State<Arc<MockState>>) -> Response {
    match serde_yaml::to_string(&state.spec) {
        Ok(yaml) => ([(header::CONTENT_TYPE, "application/yaml")], yaml).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

async fn echo(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in &headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flat.entry(name.as_str().to_string())
            .and_modify(|v| {
                v.push_str(", ");
                v.push_str(&value);
            })
            .or_insert(value);
    }

    let status = flat
        .get(STATUS_HEADER)
        .map(String::as_str)
        .or_else(|| uri.path().strip_prefix("/status/"))
        .and_then(|s| s.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .unwrap_or(StatusCode::OK);

    let recorded = RecordedRequest {
        method: method.as_str().to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        headers: flat,
        body: body.to_vec(),
    };
    let reply = json!({
        "method": recorded.method,
        "path": recorded.path,
        "query": recorded.query,
        "body": recorded.body_json(),
    });
    state.recorded.lock().push(recorded);

    (status, axum::Json(reply)).into_response()
}
