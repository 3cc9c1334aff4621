//! One remote terminal and its socket.

use std::sync::atomic::{AtomicBool, Ordering};

use jbridge_protocol::TerminalUpstream;
use log::{debug, info, warn};

use super::client::KernelServerClient;
use super::error::{KernelError, KernelResult};
use super::socket::{self, FrameReceiver, FrameSender};

/// A terminal created on the kernel server for one client connection.
pub struct TerminalSession {
    name: String,
    client: KernelServerClient,
    sender: FrameSender,
    closed: AtomicBool,
}

impl TerminalSession {
    /// Create a terminal and connect to its socket.
    ///
    /// If the socket cannot be opened the terminal is deleted before the error
    /// is returned.
    pub async fn open(client: &KernelServerClient) -> KernelResult<(Self, FrameReceiver)> {
        let name = client.create_terminal().await?;
        info!("Created terminal {}", name);

        let url = client.terminal_socket_url(&name);
        let socket = match client.connect(&url).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!("Failed to connect to terminal {}: {}", name, err);
                if let Err(e) = client.delete_terminal(&name).await {
                    warn!("Failed to delete orphaned terminal {}: {}", name, e);
                }
                return Err(err);
            }
        };

        let (sender, receiver) = socket::split(socket);
        let session = Self {
            name,
            client: client.clone(),
            sender,
            closed: AtomicBool::new(false),
        };
        Ok((session, receiver))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a frame on the terminal socket.
    pub async fn send(&self, frame: &TerminalUpstream) -> KernelResult<()> {
        if self.is_closed() {
            return Err(KernelError::Send("terminal session is closed".to_string()));
        }
        self.sender.send_text(frame.encode()).await
    }

    /// Mirror a resize over REST. Best effort.
    pub async fn resize(&self, cols: u16, rows: u16) {
        if let Err(e) = self.client.resize_terminal(&self.name, cols, rows).await {
            debug!("Terminal {} resize mirror failed: {}", self.name, e);
        }
    }

    /// Delete the remote terminal and close the socket. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.client.delete_terminal(&self.name).await {
            warn!("Failed to delete terminal {}: {}", self.name, e);
        }
        self.sender.close().await;
        info!("Closed terminal {}", self.name);
    }
}
