//! One remote kernel and its message socket.

use std::sync::atomic::{AtomicU8, Ordering};

use jbridge_protocol::Envelope;
use log::{debug, info, warn};

use super::client::KernelServerClient;
use super::error::{KernelError, KernelResult};
use super::socket::{self, FrameReceiver, FrameSender};

/// Lifecycle of a kernel session.
///
/// `Uninitialized` and `Creating` are only observable while
/// [`KernelSession::open`] runs. A failed open goes straight to `Closed` and
/// never yields a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Creating = 1,
    Ready = 2,
    Closing = 3,
    Closed = 4,
}

impl SessionState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Creating,
            2 => Self::Ready,
            3 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// A kernel created on the kernel server for one client connection.
pub struct KernelSession {
    kernel_id: String,
    /// Correlation id stamped on every envelope of this session.
    session_id: String,
    workspace: Option<String>,
    client: KernelServerClient,
    sender: FrameSender,
    state: AtomicU8,
}

impl KernelSession {
    /// Create a kernel from `spec_name` and connect to its message socket.
    ///
    /// The returned [`FrameReceiver`] is the only reader of the socket. If the
    /// socket cannot be opened the freshly created kernel is deleted before the
    /// error is returned.
    pub async fn open(
        client: &KernelServerClient,
        spec_name: &str,
        workspace: Option<String>,
    ) -> KernelResult<(Self, FrameReceiver)> {
        debug!("Kernel session state: {:?}", SessionState::Creating);
        let kernel_id = client.create_kernel(spec_name).await?;
        info!("Created kernel {} (spec {})", kernel_id, spec_name);

        let url = client.kernel_channels_url(&kernel_id);
        let socket = match client.connect(&url).await {
            Ok(socket) => socket,
            Err(err) => {
                warn!("Failed to connect to kernel {}: {}", kernel_id, err);
                if let Err(e) = client.delete_kernel(&kernel_id).await {
                    warn!("Failed to delete orphaned kernel {}: {}", kernel_id, e);
                }
                return Err(err);
            }
        };

        let (sender, receiver) = socket::split(socket);
        let session = Self {
            kernel_id,
            session_id: uuid::Uuid::new_v4().simple().to_string(),
            workspace,
            client: client.clone(),
            sender,
            state: AtomicU8::new(SessionState::Ready as u8),
        };
        Ok((session, receiver))
    }

    pub fn kernel_id(&self) -> &str {
        &self.kernel_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn workspace(&self) -> Option<&str> {
        self.workspace.as_deref()
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Send an envelope on the kernel socket.
    pub async fn send(&self, envelope: &Envelope) -> KernelResult<()> {
        if self.state() != SessionState::Ready {
            return Err(KernelError::Send("kernel session is closed".to_string()));
        }
        let text = envelope
            .to_json()
            .map_err(|e| KernelError::Send(e.to_string()))?;
        self.sender.send_text(text).await
    }

    /// Send an `execute_request` for `code`.
    pub async fn execute(&self, code: &str, store_history: bool) -> KernelResult<()> {
        let envelope = Envelope::execute_request(&self.session_id, code, false, store_history);
        self.send(&envelope).await
    }

    /// Interrupt the kernel over REST. Best effort.
    pub async fn interrupt(&self) {
        match self.client.interrupt_kernel(&self.kernel_id).await {
            Ok(()) => debug!("Interrupted kernel {}", self.kernel_id),
            Err(e) => warn!("Failed to interrupt kernel {}: {}", self.kernel_id, e),
        }
    }

    /// Delete the remote kernel and close the socket.
    ///
    /// Only the first call does anything; later and concurrent calls return
    /// immediately. Failures are logged.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(
                SessionState::Ready as u8,
                SessionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        if let Err(e) = self.client.delete_kernel(&self.kernel_id).await {
            warn!("Failed to delete kernel {}: {}", self.kernel_id, e);
        }
        self.sender.close().await;
        self.state
            .store(SessionState::Closed as u8, Ordering::SeqCst);
        info!("Closed kernel {}", self.kernel_id);
    }
}
