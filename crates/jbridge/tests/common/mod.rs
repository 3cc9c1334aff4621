//! Test utilities: an in-process fake kernel server and a bridge bound to it.
#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use jbridge::api::{AppState, create_router};
use jbridge::bootstrap::BootstrapTemplate;
use jbridge::kernel::{KernelServerClient, KernelServerConfig};
use jbridge::workspace::WorkspaceDirectory;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub const TOKEN: &str = "test-token";

/// Preamble used by test bridges. Small enough to assert on.
pub const TEST_BOOTSTRAP: &str =
    "# bootstrap kernel={{KERNEL_ID}} session={{SESSION_ID}} packages={{REQUIRED_PACKAGES}}";

pub type BrowserSocket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// What the fake kernel server has seen.
#[derive(Default)]
pub struct FakeState {
    pub refuse_kernels: bool,
    pub refuse_terminals: bool,
    /// Answer socket upgrades with 403 while REST calls keep working.
    pub refuse_sockets: bool,
    pub kernels_created: AtomicUsize,
    pub kernels_deleted: AtomicUsize,
    pub interrupts: AtomicUsize,
    pub terminals_created: AtomicUsize,
    pub terminals_deleted: AtomicUsize,
    pub kernel_specs: Mutex<Vec<String>>,
    pub auth_headers: Mutex<Vec<String>>,
    pub socket_tokens: Mutex<Vec<String>>,
    /// Frames received on kernel channel sockets.
    pub kernel_frames: Mutex<Vec<Value>>,
    /// Frames received on terminal sockets.
    pub terminal_frames: Mutex<Vec<Value>>,
    /// Bodies of terminal resize calls.
    pub resizes: Mutex<Vec<Value>>,
}

impl FakeState {
    pub async fn executed_code(&self) -> Vec<String> {
        self.kernel_frames
            .lock()
            .await
            .iter()
            .filter(|f| f["header"]["msg_type"] == "execute_request")
            .filter_map(|f| f["content"]["code"].as_str().map(String::from))
            .collect()
    }
}

/// A kernel server stand-in listening on an ephemeral port.
pub struct FakeKernelServer {
    pub addr: SocketAddr,
    pub state: Arc<FakeState>,
}

impl FakeKernelServer {
    pub async fn start() -> Self {
        Self::start_with(FakeState::default()).await
    }

    pub async fn start_with(state: FakeState) -> Self {
        let state = Arc::new(state);
        let app = Router::new()
            .route("/api/kernels", post(create_kernel))
            .route("/api/kernels/{id}", delete(delete_kernel))
            .route("/api/kernels/{id}/interrupt", post(interrupt_kernel))
            .route("/api/kernels/{id}/channels", get(kernel_channels))
            .route("/api/terminals", post(create_terminal))
            .route("/api/terminals/{name}", delete(delete_terminal))
            .route("/api/terminals/{name}/size", patch(resize_terminal))
            .route("/terminals/websocket/{name}", get(terminal_socket))
            .with_state(Arc::clone(&state));

        let addr = serve(app).await;
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn record_auth(state: &FakeState, headers: &HeaderMap) {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        state.auth_headers.lock().await.push(value.to_string());
    }
}

async fn create_kernel(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    record_auth(&state, &headers).await;
    if state.refuse_kernels {
        return (StatusCode::INTERNAL_SERVER_ERROR, "No such kernel named ws_nope").into_response();
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    state.kernel_specs.lock().await.push(name.clone());
    let n = state.kernels_created.fetch_add(1, Ordering::SeqCst) + 1;
    (
        StatusCode::CREATED,
        Json(json!({ "id": format!("kernel-{n}"), "name": name })),
    )
        .into_response()
}

async fn delete_kernel(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    UrlPath(_id): UrlPath<String>,
) -> StatusCode {
    record_auth(&state, &headers).await;
    state.kernels_deleted.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn interrupt_kernel(
    State(state): State<Arc<FakeState>>,
    UrlPath(_id): UrlPath<String>,
) -> StatusCode {
    state.interrupts.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn kernel_channels(
    State(state): State<Arc<FakeState>>,
    UrlPath(_id): UrlPath<String>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    if let Some(token) = query.get("token") {
        state.socket_tokens.lock().await.push(token.clone());
    }
    if state.refuse_sockets {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| run_kernel(socket, state))
}

fn reply(msg_type: &str, content: Value) -> Message {
    let frame = json!({
        "header": {"msg_id": "fake", "msg_type": msg_type, "session": "kernel"},
        "parent_header": {},
        "metadata": {},
        "content": content,
        "channel": "iopub",
        "msg_type": msg_type,
    });
    Message::Text(frame.to_string().into())
}

/// Answer execute requests like a kernel would, keyed on the code text.
///
/// Code containing `die_now` makes the server close the socket instead.
async fn run_kernel(mut socket: WebSocket, state: Arc<FakeState>) {
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        state.kernel_frames.lock().await.push(frame.clone());
        if frame["header"]["msg_type"] != "execute_request" {
            continue;
        }
        let code = frame["content"]["code"].as_str().unwrap_or_default().to_string();
        if code.contains("die_now") {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }

        let mut replies = vec![reply("status", json!({"execution_state": "busy"}))];
        if code.contains("noise") {
            replies.push(Message::Text("{not an envelope".into()));
            replies.push(reply("comm_open", json!({"comm_id": "c"})));
            replies.push(reply("stream", json!({"oops": true})));
        }
        if code.contains("print(1+1)") {
            replies.push(reply("stream", json!({"name": "stdout", "text": "2\n"})));
        }
        if code.contains("warn(") {
            replies.push(reply("stream", json!({"name": "stderr", "text": "careful\n"})));
        }
        if code.contains("raise") {
            replies.push(reply(
                "error",
                json!({
                    "ename": "ZeroDivisionError",
                    "evalue": "division by zero",
                    "traceback": ["Traceback (most recent call last)", "ZeroDivisionError: division by zero"],
                }),
            ));
        }
        if code.contains("arrow") {
            replies.push(reply(
                "execute_result",
                json!({"data": {"text/plain": "<table>"}, "execution_count": 1}),
            ));
            replies.push(reply(
                "display_data",
                json!({"data": {"application/vnd.apache.arrow.stream": "QVJST1cx"}}),
            ));
        }
        if !code.contains("hang") {
            replies.push(reply("status", json!({"execution_state": "idle"})));
        }

        for message in replies {
            if socket.send(message).await.is_err() {
                return;
            }
        }
    }
}

async fn create_terminal(State(state): State<Arc<FakeState>>, headers: HeaderMap) -> Response {
    record_auth(&state, &headers).await;
    if state.refuse_terminals {
        return (StatusCode::FORBIDDEN, "terminals disabled").into_response();
    }
    let n = state.terminals_created.fetch_add(1, Ordering::SeqCst) + 1;
    Json(json!({ "name": n.to_string() })).into_response()
}

async fn delete_terminal(
    State(state): State<Arc<FakeState>>,
    UrlPath(_name): UrlPath<String>,
) -> StatusCode {
    state.terminals_deleted.fetch_add(1, Ordering::SeqCst);
    StatusCode::NO_CONTENT
}

async fn resize_terminal(
    State(state): State<Arc<FakeState>>,
    UrlPath(_name): UrlPath<String>,
    Json(body): Json<Value>,
) -> StatusCode {
    state.resizes.lock().await.push(body);
    StatusCode::OK
}

async fn terminal_socket(
    State(state): State<Arc<FakeState>>,
    UrlPath(_name): UrlPath<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.refuse_sockets {
        return StatusCode::FORBIDDEN.into_response();
    }
    ws.on_upgrade(move |socket| run_terminal(socket, state))
}

/// Echo stdin back as stdout, the way a shell with echo on would.
async fn run_terminal(mut socket: WebSocket, state: Arc<FakeState>) {
    let hello = json!(["setup", {}]).to_string();
    if socket.send(Message::Text(hello.into())).await.is_err() {
        return;
    }
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
            continue;
        };
        state.terminal_frames.lock().await.push(frame.clone());
        if frame[0] == "stdin" {
            let echo = json!(["stdout", frame[1]]).to_string();
            if socket.send(Message::Text(echo.into())).await.is_err() {
                return;
            }
        }
    }
}

/// Start a bridge in front of `kernel_url`.
pub async fn start_bridge(kernel_url: &str, workspace_root: &Path) -> SocketAddr {
    let app = create_router(test_state(kernel_url, workspace_root));
    serve(app).await
}

/// A kernel server client with short timeouts.
pub fn server_client(kernel_url: &str) -> KernelServerClient {
    let config = KernelServerConfig {
        url: kernel_url.to_string(),
        token: TOKEN.to_string(),
        create_timeout_secs: 2,
        request_timeout_secs: 1,
        ..KernelServerConfig::default()
    };
    KernelServerClient::new(&config).unwrap()
}

pub fn test_state(kernel_url: &str, workspace_root: &Path) -> AppState {
    let kernels = server_client(kernel_url);
    let workspaces = WorkspaceDirectory::new(
        workspace_root,
        vec!["duckdb".to_string(), "pandas".to_string()],
    );
    AppState::new(
        kernels,
        BootstrapTemplate::from_source(TEST_BOOTSTRAP),
        workspaces,
        Vec::new(),
    )
}

pub async fn connect(bridge: SocketAddr, path: &str) -> BrowserSocket {
    let (socket, _) = connect_async(format!("ws://{bridge}{path}")).await.unwrap();
    socket
}

/// Next text or binary frame, or `None` once the bridge closed the socket.
pub async fn next_frame(socket: &mut BrowserSocket) -> Option<WsMessage> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a frame");
        match msg {
            Some(Ok(WsMessage::Text(text))) => return Some(WsMessage::Text(text)),
            Some(Ok(WsMessage::Binary(data))) => return Some(WsMessage::Binary(data)),
            Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Next JSON message from the execute socket.
pub async fn next_json(socket: &mut BrowserSocket) -> Option<Value> {
    match next_frame(socket).await? {
        WsMessage::Text(text) => Some(serde_json::from_str(text.as_str()).unwrap()),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

/// Skip JSON messages until one matches.
pub async fn wait_for_json(socket: &mut BrowserSocket, pred: impl Fn(&Value) -> bool) -> Value {
    loop {
        let msg = next_json(socket).await.expect("socket closed while waiting");
        if pred(&msg) {
            return msg;
        }
    }
}

/// Open an execute socket and wait for the ready status.
pub async fn open_execute(bridge: SocketAddr, path: &str) -> BrowserSocket {
    let mut socket = connect(bridge, path).await;
    wait_for_json(&mut socket, |m| {
        m["type"] == "status" && m["execution_state"] == "ready"
    })
    .await;
    socket
}

pub async fn send_json(socket: &mut BrowserSocket, value: Value) {
    socket
        .send(WsMessage::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Poll until `check` passes or two seconds elapse.
pub async fn eventually(mut check: impl AsyncFnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
