//! Execution relay.
//!
//! One kernel per browser connection. The browser sends execute and interrupt
//! requests; kernel output comes back as `ClientMessage`s.
//!
//! Three tasks run per connection:
//! - a writer that owns the browser sink and drains a bounded channel,
//! - a listener that reads the kernel socket and classifies frames,
//! - the request loop, which reads the browser socket and writes the kernel.
//!
//! The kernel is deleted once, after the listener or the request loop stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use jbridge_protocol::{Action, ClientMessage, ClientRequest, OutboundFrame, classify, parse_envelope};
use log::{debug, info, warn};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::bootstrap::BootstrapParams;
use crate::kernel::{FrameReceiver, KernelError, KernelSession};
use crate::transform::{TemplateContext, transform};
use crate::workspace::{kernel_spec_name, sanitize_name};

/// Pending messages to the browser before producers wait.
const CLIENT_QUEUE: usize = 256;

/// How long the writer gets to flush after teardown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Text sent when the kernel socket stops accepting writes.
const LOST_CONNECTION: &str = "Lost connection to the kernel.";

/// Queue towards the browser writer.
///
/// Clones share one flag so that only the first connection-ending error
/// reaches the browser.
#[derive(Clone)]
struct Outbox {
    tx: mpsc::Sender<ClientMessage>,
    fatal_sent: Arc<AtomicBool>,
}

impl Outbox {
    fn new(tx: mpsc::Sender<ClientMessage>) -> Self {
        Self {
            tx,
            fatal_sent: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Queue a message. Returns false once the writer is gone.
    async fn send(&self, msg: ClientMessage) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    /// Queue the error that ends this connection, unless one was already queued.
    async fn report_fatal(&self, text: impl Into<String>) {
        if self.fatal_sent.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(ClientMessage::error(text)).await;
    }
}

/// Query parameters of the execute socket.
#[derive(Debug, Default, Deserialize)]
pub struct ExecuteQuery {
    pub workspace: Option<String>,
}

/// Validate the requested workspace name.
///
/// Absent or empty means no workspace. Names with characters outside
/// `[A-Za-z0-9_-]` are rejected rather than silently rewritten.
pub fn resolve_workspace(raw: Option<&str>) -> ApiResult<Option<String>> {
    let Some(raw) = raw.filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    match sanitize_name(raw) {
        Some(name) if name == raw => Ok(Some(name)),
        _ => Err(ApiError::bad_request(format!(
            "invalid workspace name: {raw:?}"
        ))),
    }
}

/// Upgrade handler for `/ws/execute`.
pub async fn execute_ws(
    State(state): State<AppState>,
    Query(query): Query<ExecuteQuery>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    let workspace = resolve_workspace(query.workspace.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_execute(socket, state, workspace)))
}

async fn handle_execute(socket: WebSocket, state: AppState, workspace: Option<String>) {
    let (client_tx, client_rx) = socket.split();
    let (out_tx, out_rx) = mpsc::channel::<ClientMessage>(CLIENT_QUEUE);
    let writer = tokio::spawn(write_client(client_tx, out_rx));
    let outbox = Outbox::new(out_tx);

    let spec = match workspace.as_deref() {
        Some(name) => kernel_spec_name(name),
        None => state.kernels.default_spec().to_string(),
    };

    let (session, kernel_rx) =
        match KernelSession::open(&state.kernels, &spec, workspace.clone()).await {
            Ok(opened) => opened,
            Err(e) => {
                warn!("Failed to start kernel ({}): {}", spec, e);
                outbox.report_fatal(e.to_string()).await;
                drop(outbox);
                finish_writer(writer).await;
                return;
            }
        };
    let session = Arc::new(session);
    info!(
        "Execution session {} on kernel {} (workspace {:?})",
        session.session_id(),
        session.kernel_id(),
        workspace
    );

    let packages = state
        .workspaces
        .required_packages(workspace.as_deref())
        .await;
    let session_link = state.kernels.session_link();
    let preamble = state.bootstrap.render(&BootstrapParams {
        kernel_id: session.kernel_id(),
        session_id: session.session_id(),
        server_url: state.kernels.base_url(),
        session_link: &session_link,
        required_packages: &packages,
    });

    if let Err(e) = session.execute(&preamble, false).await {
        warn!("Failed to send bootstrap to kernel {}: {}", session.kernel_id(), e);
        outbox.report_fatal(e.to_string()).await;
        session.close().await;
        drop(outbox);
        finish_writer(writer).await;
        return;
    }

    let mut listener = tokio::spawn(listen_kernel(kernel_rx, outbox.clone()));
    outbox.send(ClientMessage::ready()).await;

    tokio::select! {
        _ = forward_requests(client_rx, &session, workspace.as_deref(), &outbox) => {
            debug!("Request loop ended for kernel {}", session.kernel_id());
        }
        _ = &mut listener => {
            debug!("Listener ended for kernel {}", session.kernel_id());
        }
    }

    listener.abort();
    session.close().await;
    drop(outbox);
    finish_writer(writer).await;
}

/// Drain queued messages into the browser socket.
async fn write_client(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<ClientMessage>,
) {
    while let Some(msg) = rx.recv().await {
        let frame = match msg.into_frame() {
            Ok(OutboundFrame::Text(text)) => Message::Text(text.into()),
            Ok(OutboundFrame::Binary(data)) => Message::Binary(data.into()),
            Err(e) => {
                warn!("Failed to serialize client message: {}", e);
                continue;
            }
        };
        if sink.send(frame).await.is_err() {
            debug!("Browser socket closed while writing");
            return;
        }
    }
    let _ = sink.close().await;
}

async fn finish_writer(writer: tokio::task::JoinHandle<()>) {
    if tokio::time::timeout(DRAIN_TIMEOUT, writer).await.is_err() {
        debug!("Browser writer did not drain in time");
    }
}

/// Read kernel frames and queue the ones the browser cares about.
///
/// A close by the kernel server is reported to the browser like any other
/// socket failure.
async fn listen_kernel(mut kernel_rx: FrameReceiver, outbox: Outbox) {
    loop {
        let frame = match kernel_rx.recv().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                warn!("Kernel socket closed by server");
                let err = KernelError::Socket("closed by kernel server".to_string());
                outbox.report_fatal(err.to_string()).await;
                return;
            }
            Err(e) => {
                warn!("Kernel socket failed: {}", e);
                outbox.report_fatal(e.to_string()).await;
                return;
            }
        };

        let envelope = match parse_envelope(frame.as_bytes()) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Dropping undecodable kernel frame: {}", e);
                continue;
            }
        };

        if let Some(msg) = classify(&envelope)
            && !outbox.send(msg).await
        {
            return;
        }
    }
}

/// Read browser requests until the browser leaves or the kernel link breaks.
async fn forward_requests(
    mut client_rx: SplitStream<WebSocket>,
    session: &Arc<KernelSession>,
    workspace: Option<&str>,
    outbox: &Outbox,
) {
    while let Some(msg) = client_rx.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => {
                debug!("Browser closed execute socket");
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                debug!("Browser socket error: {}", e);
                return;
            }
        };

        let request = match ClientRequest::from_json(text.as_str()) {
            Ok(request) => request,
            Err(e) => {
                debug!("Ignoring malformed request: {}", e);
                continue;
            }
        };

        match request.action {
            Action::Execute => {
                let context = TemplateContext::capture(workspace);
                let code = transform(
                    request.code(),
                    request.mode(),
                    request.filename(),
                    &context,
                );
                if code.is_empty() {
                    continue;
                }
                if let Err(e) = session.execute(&code, true).await {
                    warn!("Execute send failed on kernel {}: {}", session.kernel_id(), e);
                    outbox.report_fatal(LOST_CONNECTION).await;
                    return;
                }
            }
            Action::Interrupt => {
                let session = Arc::clone(session);
                tokio::spawn(async move { session.interrupt().await });
            }
            Action::Unknown => {
                debug!("Ignoring request with unknown action");
            }
        }
    }
}
