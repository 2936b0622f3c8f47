//! Fake identity endpoint and telemetry API.

use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const TOKEN_PATH: &str = "/oauth2/token";

/// A scripted HTTP reply.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: JsonValue) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn resources(items: JsonValue) -> Self {
        Self::json(200, json!({ "resources": items }))
    }

    pub fn status(status: u16) -> Self {
        Self::json(status, json!({ "errors": [{ "code": status }] }))
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// One telemetry API request as the server saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct FakeState {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    defaults: Mutex<HashMap<String, Reply>>,
    rejected_clients: Mutex<HashSet<String>>,
    issued_tokens: AtomicUsize,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// In-process server on a random local port.
///
/// When dropped, the server shuts down.
pub struct FakeTelemetryApi {
    /// Telemetry API base URL (e.g., "http://127.0.0.1:12345")
    pub base_url: String,
    pub token_url: String,
    state: Arc<FakeState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeTelemetryApi {
    pub async fn spawn() -> Self {
        let state = Arc::new(FakeState::default());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let app = Router::new()
            .route(TOKEN_PATH, post(issue_token))
            .fallback(telemetry)
            .with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Fake API failed");
        });

        Self {
            token_url: format!("{}{}", base_url, TOKEN_PATH),
            base_url,
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Queues replies for `path`, served in order before the default.
    pub fn script(&self, path: &str, replies: Vec<Reply>) {
        self.state
            .scripts
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend(replies);
    }

    /// Reply served for `path` once its script is exhausted.
    pub fn set_default(&self, path: &str, reply: Reply) {
        self.state
            .defaults
            .lock()
            .unwrap()
            .insert(path.to_string(), reply);
    }

    /// The identity endpoint answers 401 for this client id.
    pub fn reject_client(&self, client_id: &str) {
        self.state
            .rejected_clients
            .lock()
            .unwrap()
            .insert(client_id.to_string());
    }

    pub fn issued_tokens(&self) -> usize {
        self.state.issued_tokens.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

async fn issue_token(
    State(state): State<Arc<FakeState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let client_id = form.get("client_id").cloned().unwrap_or_default();
    if form.get("client_secret").is_none()
        || state.rejected_clients.lock().unwrap().contains(&client_id)
    {
        return reply(&Reply::status(401));
    }

    let n = state.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
    reply(&Reply::json(
        200,
        json!({
            "access_token": format!("{}-token-{}", client_id, n),
            "expires_in": 3600,
            "token_type": "bearer"
        }),
    ))
}

async fn telemetry(State(state): State<Arc<FakeState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        path: path.clone(),
        query: uri.query().map(str::to_string),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let scripted = state
        .scripts
        .lock()
        .unwrap()
        .get_mut(&path)
        .and_then(VecDeque::pop_front);
    let next = scripted
        .or_else(|| state.defaults.lock().unwrap().get(&path).cloned())
        .unwrap_or_else(|| Reply::resources(json!([])));
    reply(&next)
}

fn reply(reply: &Reply) -> Response {
    let status = StatusCode::from_u16(reply.status).expect("Invalid scripted status");
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        reply.body.clone(),
    )
        .into_response()
}
