//! Kernel messaging envelopes and the codec that maps them onto client messages.
//!
//! Every frame on a kernel socket is a JSON envelope:
//!
//! ```text
//! { header, parent_header, metadata, content, [channel], [msg_type] }
//! ```
//!
//! Outbound requests are built with [`Envelope::execute_request`]. Inbound frames
//! are parsed with [`parse_envelope`], typed with [`Envelope::kind`], and reduced to
//! at most one [`ClientMessage`] by [`classify`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::client::ClientMessage;

/// Messaging protocol version stamped on outbound headers.
pub const PROTOCOL_VERSION: &str = "5.3";

/// Username stamped on outbound headers.
pub const BRIDGE_USERNAME: &str = "jbridge";

/// MIME key carrying Arrow IPC stream payloads in display bundles.
pub const ARROW_STREAM_MIME: &str = "application/vnd.apache.arrow.stream";

/// A kernel frame that could not be decoded. Never fatal to a session.
#[derive(Debug, Error)]
#[error("malformed kernel frame: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

/// Envelope header.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    pub msg_id: String,
    pub username: String,
    /// Session identifier, constant for the lifetime of a kernel session.
    pub session: String,
    pub msg_type: String,
    pub version: String,
    pub date: String,
}

/// A kernel protocol envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub header: Header,
    /// Empty for requests originated by the bridge.
    #[serde(default)]
    pub parent_header: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub content: Map<String, Value>,
    /// Socket channel (`shell`, `iopub`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Top-level mirror of `header.msg_type` added by some kernel servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<String>,
}

impl Envelope {
    /// Build a request envelope on the shell channel.
    pub fn request(session_id: &str, msg_type: &str, content: Map<String, Value>) -> Self {
        Self {
            header: Header {
                msg_id: uuid::Uuid::new_v4().simple().to_string(),
                username: BRIDGE_USERNAME.to_string(),
                session: session_id.to_string(),
                msg_type: msg_type.to_string(),
                version: PROTOCOL_VERSION.to_string(),
                date: chrono::Utc::now().to_rfc3339(),
            },
            parent_header: Map::new(),
            metadata: Map::new(),
            content,
            channel: Some("shell".to_string()),
            msg_type: None,
        }
    }

    /// Build an `execute_request`.
    pub fn execute_request(session_id: &str, code: &str, silent: bool, store_history: bool) -> Self {
        let mut content = Map::new();
        content.insert("code".into(), Value::from(code));
        content.insert("silent".into(), Value::from(silent));
        content.insert("store_history".into(), Value::from(store_history));
        content.insert("user_expressions".into(), Value::Object(Map::new()));
        content.insert("allow_stdin".into(), Value::from(false));
        Self::request(session_id, "execute_request", content)
    }

    /// Message type, preferring the header over the top-level mirror.
    pub fn msg_type(&self) -> &str {
        if !self.header.msg_type.is_empty() {
            return &self.header.msg_type;
        }
        self.msg_type.as_deref().unwrap_or_default()
    }

    /// Serialize for the kernel socket.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Type the envelope by its message type.
    ///
    /// Content that does not match the expected shape for its type is reported
    /// as [`KernelMessage::Other`].
    pub fn kind(&self) -> KernelMessage {
        let msg_type = self.msg_type();
        let content = Value::Object(self.content.clone());
        let typed = match msg_type {
            "stream" => serde_json::from_value(content).map(KernelMessage::Stream),
            "error" => serde_json::from_value(content).map(KernelMessage::Error),
            "display_data" => serde_json::from_value(content).map(KernelMessage::DisplayData),
            "execute_result" => serde_json::from_value(content).map(KernelMessage::ExecuteResult),
            "status" => serde_json::from_value(content).map(KernelMessage::Status),
            other => return KernelMessage::Other(other.to_string()),
        };
        typed.unwrap_or_else(|_| KernelMessage::Other(msg_type.to_string()))
    }
}

/// Parse a raw kernel frame.
pub fn parse_envelope(raw: impl AsRef<[u8]>) -> Result<Envelope, DecodeError> {
    Ok(serde_json::from_slice(raw.as_ref())?)
}

// ============================================================================
// Typed kernel messages
// ============================================================================

/// Kernel messages the bridge understands.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelMessage {
    Stream(StreamContent),
    Error(ErrorContent),
    DisplayData(MimeBundle),
    ExecuteResult(MimeBundle),
    Status(StatusContent),
    /// Any other message type. Filtered out by the bridge.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StreamContent {
    #[serde(default)]
    pub name: String,
    pub text: String,
}

impl StreamContent {
    pub fn is_stderr(&self) -> bool {
        self.name == "stderr"
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ErrorContent {
    #[serde(default)]
    pub ename: String,
    #[serde(default)]
    pub evalue: String,
    #[serde(default)]
    pub traceback: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MimeBundle {
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl MimeBundle {
    /// Arrow IPC bytes, if the bundle carries them.
    ///
    /// String values are base64 (whitespace tolerated). Arrays of byte values are
    /// taken verbatim.
    pub fn arrow_payload(&self) -> Option<Vec<u8>> {
        match self.data.get(ARROW_STREAM_MIME)? {
            Value::String(encoded) => {
                let compact: String = encoded
                    .chars()
                    .filter(|c| !c.is_ascii_whitespace())
                    .collect();
                STANDARD.decode(compact).ok()
            }
            Value::Array(items) => items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusContent {
    pub execution_state: String,
}

impl StatusContent {
    pub fn is_idle(&self) -> bool {
        self.execution_state == "idle"
    }
}

/// Reduce a kernel envelope to the message the browser should see, if any.
///
/// Result bundles without an Arrow payload are dropped, as are all message
/// types other than `stream`, `error`, `display_data`, `execute_result` and an
/// idle `status`.
pub fn classify(envelope: &Envelope) -> Option<ClientMessage> {
    match envelope.kind() {
        KernelMessage::Stream(stream) if stream.is_stderr() => {
            Some(ClientMessage::error(stream.text))
        }
        KernelMessage::Stream(stream) => Some(ClientMessage::stdout(stream.text)),
        KernelMessage::Error(err) => Some(ClientMessage::error(err.traceback.join("\n"))),
        KernelMessage::DisplayData(bundle) | KernelMessage::ExecuteResult(bundle) => {
            bundle.arrow_payload().map(ClientMessage::Binary)
        }
        KernelMessage::Status(status) if status.is_idle() => Some(ClientMessage::Done),
        KernelMessage::Status(_) | KernelMessage::Other(_) => None,
    }
}
