//! Kernel server error types.

use thiserror::Error;

/// Result type for kernel server operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors that can occur while talking to the kernel server.
///
/// The `Display` text of each variant is what the browser sees when the error
/// ends a connection.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Nothing answered at the configured URL (refused, DNS, timeout).
    #[error("Kernel server is not running or unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    /// The server refused to create a kernel or terminal.
    #[error("Kernel server error: {status} - {body}")]
    Creation { status: u16, body: String },

    /// A best-effort REST call was answered with a failure status.
    #[error("Kernel server rejected {operation}: {status} - {body}")]
    Rejected {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The message socket could not be opened or is broken.
    #[error("Kernel socket error: {0}")]
    Socket(String),

    /// Writing to the message socket failed.
    #[error("Kernel send failed: {0}")]
    Send(String),

    /// The server answered with a body we could not understand.
    #[error("Invalid kernel server response: {0}")]
    InvalidResponse(String),

    /// Any other HTTP failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}
