//! Terminal socket framing.
//!
//! Kernel-server terminals speak JSON arrays of the form `[channel, payload]`:
//!
//! ```text
//! Client -> Server:  ["stdin", "ls\r"]   ["setup", {"rows": 40, "cols": 120}]
//! Server -> Client:  ["stdout", "..."]   ["disconnect", 1]
//! ```
//!
//! The browser side is a small tagged JSON protocol (`input` / `resize`).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// A frame sent by the browser on the terminal socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TerminalClientFrame {
    /// Keystrokes.
    Input {
        #[serde(default)]
        data: String,
    },
    /// Terminal geometry change.
    Resize { cols: u16, rows: u16 },
}

impl TerminalClientFrame {
    /// Parse a browser frame. Malformed frames yield `None`.
    pub fn parse(text: &str) -> Option<Self> {
        serde_json::from_str(text).ok()
    }

    /// The upstream frame for this input, if it carries anything to send.
    ///
    /// Empty input and zero-sized resizes are dropped.
    pub fn to_upstream(&self) -> Option<TerminalUpstream> {
        match self {
            Self::Input { data } if !data.is_empty() => Some(TerminalUpstream::Stdin(data.clone())),
            Self::Resize { cols, rows } if *cols > 0 && *rows > 0 => Some(TerminalUpstream::Setup {
                cols: *cols,
                rows: *rows,
            }),
            _ => None,
        }
    }
}

/// A frame sent to the kernel-server terminal socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalUpstream {
    Stdin(String),
    Setup { cols: u16, rows: u16 },
}

impl TerminalUpstream {
    pub fn encode(&self) -> String {
        match self {
            Self::Stdin(data) => json!(["stdin", data]).to_string(),
            Self::Setup { cols, rows } => json!(["setup", {"rows": rows, "cols": cols}]).to_string(),
        }
    }
}

/// What to do with a frame received from the terminal socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutput {
    /// Forward this text to the browser.
    Forward(String),
    /// Not for the browser.
    Drop,
}

/// Classify a text frame from the terminal socket.
///
/// Only `stdout` payloads are forwarded. Text that is not JSON at all is
/// forwarded verbatim.
pub fn parse_terminal_output(text: &str) -> TerminalOutput {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return TerminalOutput::Forward(text.to_string());
    };
    let Value::Array(items) = value else {
        return TerminalOutput::Drop;
    };
    match items.as_slice() {
        [Value::String(channel), Value::String(payload), ..] if channel == "stdout" => {
            TerminalOutput::Forward(payload.clone())
        }
        _ => TerminalOutput::Drop,
    }
}
