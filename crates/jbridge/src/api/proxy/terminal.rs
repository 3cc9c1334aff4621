//! Terminal relay.
//!
//! Kernel server terminals speak JSON arrays (`["stdin", data]`,
//! `["stdout", data]`, `["setup", {..}]`). The browser sends
//! `{"type":"input"|"resize",...}` and receives raw output text.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use jbridge_protocol::{
    TerminalClientFrame, TerminalOutput, TerminalUpstream, parse_terminal_output,
};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use crate::api::state::AppState;
use crate::kernel::{Frame, FrameReceiver, KernelError, TerminalSession};

type ClientSink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Upgrade handler for `/ws/terminal`.
pub async fn terminal_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_terminal(socket, state))
}

async fn handle_terminal(socket: WebSocket, state: AppState) {
    let (client_tx, client_rx) = socket.split();
    let client_tx: ClientSink = Arc::new(Mutex::new(client_tx));

    let (session, terminal_rx) = match TerminalSession::open(&state.kernels).await {
        Ok(opened) => opened,
        Err(e) => {
            warn!("Failed to open terminal: {}", e);
            let mut sink = client_tx.lock().await;
            let _ = sink.send(Message::Text(open_error_line(&e).into())).await;
            let _ = sink.close().await;
            return;
        }
    };
    let session = Arc::new(session);
    info!("Terminal relay started for {}", session.name());

    tokio::select! {
        _ = terminal_to_client(terminal_rx, Arc::clone(&client_tx)) => {
            debug!("Terminal {} output ended", session.name());
        }
        _ = client_to_terminal(client_rx, &session) => {
            debug!("Browser left terminal {}", session.name());
        }
    }

    session.close().await;
    let _ = client_tx.lock().await.close().await;
}

/// Text line shown in the browser terminal when setup fails.
fn open_error_line(err: &KernelError) -> String {
    match err {
        KernelError::Socket(detail) => {
            format!("Error connecting to terminal socket: {detail}\r\n")
        }
        other => format!("Error creating terminal: {other}\r\n"),
    }
}

async fn terminal_to_client(mut terminal_rx: FrameReceiver, client_tx: ClientSink) {
    loop {
        let text = match terminal_rx.recv().await {
            Ok(Some(Frame::Text(text))) => text,
            Ok(Some(Frame::Binary(data))) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => continue,
            },
            Ok(None) => return,
            Err(e) => {
                debug!("Terminal socket failed: {}", e);
                return;
            }
        };

        if let TerminalOutput::Forward(output) = parse_terminal_output(&text)
            && client_tx
                .lock()
                .await
                .send(Message::Text(output.into()))
                .await
                .is_err()
        {
            return;
        }
    }
}

async fn client_to_terminal(mut client_rx: SplitStream<WebSocket>, session: &Arc<TerminalSession>) {
    while let Some(msg) = client_rx.next().await {
        let frame = match msg {
            Ok(Message::Text(text)) => TerminalClientFrame::parse(text.as_str()),
            Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                Ok(text) => Some(TerminalClientFrame::Input {
                    data: text.to_string(),
                }),
                Err(_) => None,
            },
            Ok(Message::Close(_)) => return,
            Ok(_) => continue,
            Err(e) => {
                debug!("Browser socket error: {}", e);
                return;
            }
        };

        let Some(upstream) = frame.as_ref().and_then(TerminalClientFrame::to_upstream) else {
            continue;
        };

        if let Err(e) = session.send(&upstream).await {
            warn!("Terminal {} send failed: {}", session.name(), e);
            return;
        }

        if let TerminalUpstream::Setup { cols, rows } = upstream {
            let session = Arc::clone(session);
            tokio::spawn(async move { session.resize(cols, rows).await });
        }
    }
}
