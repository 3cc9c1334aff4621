//! Browser-facing protocol.
//!
//! Inbound frames are small JSON requests (`{action, code, mode, filename}`).
//! Outbound frames are either tagged JSON events or raw binary payloads
//! (Arrow IPC streams produced by the kernel).

use serde::{Deserialize, Serialize};

// ============================================================================
// Requests (Client -> Bridge)
// ============================================================================

/// What the client wants the bridge to do with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Run the attached code in the kernel.
    Execute,
    /// Interrupt whatever the kernel is running.
    Interrupt,
    /// Anything else. Ignored by the relay.
    #[default]
    #[serde(other)]
    Unknown,
}

/// How submitted code should be interpreted before it reaches the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Native kernel code, sent as-is.
    #[default]
    Python,
    /// SQL text, wrapped in a call to the kernel-side SQL helper.
    Sql,
    /// System files (`requirements.txt`, `.env`) applied to the kernel process.
    System,
    /// Unrecognized modes are treated like native code.
    #[serde(other)]
    Other,
}

/// One request frame sent by the browser on the execute socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    #[serde(default)]
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,
    /// Only consulted for [`Mode::System`] to pick the wrapper.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl ClientRequest {
    /// Parse a text frame from the browser.
    ///
    /// Only JSON objects are accepted; positional arrays are rejected.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if !value.is_object() {
            return Err(serde::de::Error::custom("request must be a JSON object"));
        }
        serde_json::from_value(value)
    }

    pub fn code(&self) -> &str {
        self.code.as_deref().unwrap_or_default()
    }

    pub fn mode(&self) -> Mode {
        self.mode.unwrap_or_default()
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }
}

// ============================================================================
// Messages (Bridge -> Client)
// ============================================================================

/// Messages sent from the bridge to the browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Standard output from the kernel.
    Stdout { text: String },

    /// Standard error, tracebacks, and bridge-level failures.
    Error { text: String },

    /// The kernel went idle: the last execute request has fully completed.
    Done,

    /// Bridge lifecycle status (`ready` once the bootstrap has been sent).
    Status { execution_state: String },

    /// Raw columnar payload. Sent as a binary frame, never as JSON.
    #[serde(skip)]
    Binary(Vec<u8>),
}

/// A frame ready to be written to the browser socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl ClientMessage {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self::Stdout { text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::Error { text: text.into() }
    }

    /// The status sent once the kernel session is usable.
    pub fn ready() -> Self {
        Self::Status {
            execution_state: "ready".to_string(),
        }
    }

    /// Convert into a socket frame.
    pub fn into_frame(self) -> serde_json::Result<OutboundFrame> {
        match self {
            Self::Binary(data) => Ok(OutboundFrame::Binary(data)),
            other => serde_json::to_string(&other).map(OutboundFrame::Text),
        }
    }
}
