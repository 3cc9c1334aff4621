//! Kernel server integration.
//!
//! Provides the REST client for the kernel server and the per-connection
//! kernel and terminal sessions built on top of it.

mod client;
mod error;
mod session;
mod socket;
mod terminal;

pub use client::{KernelServerClient, KernelServerConfig};
pub use error::{KernelError, KernelResult};
pub use session::{KernelSession, SessionState};
pub use socket::{Frame, FrameReceiver, KernelSocket};
pub use terminal::TerminalSession;
