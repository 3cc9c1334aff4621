//! Wire types for jbridge.
//!
//! jbridge sits between a browser and a remote kernel server and speaks two
//! protocols at once:
//!
//! ```text
//! Browser <--[WS: client protocol]--> jbridge <--[WS: kernel envelopes]--> Kernel server
//! ```
//!
//! - [`envelope`]: the envelope-framed kernel messaging protocol, plus the codec
//!   that maps kernel messages onto client messages.
//! - [`client`]: the simplified protocol spoken to the browser.
//! - [`terminal`]: the `[channel, payload]` framing used by terminal sockets.

pub mod client;
pub mod envelope;
pub mod terminal;

pub use client::{Action, ClientMessage, ClientRequest, Mode, OutboundFrame};
pub use envelope::{
    ARROW_STREAM_MIME, DecodeError, Envelope, Header, KernelMessage, PROTOCOL_VERSION, classify,
    parse_envelope,
};
pub use terminal::{TerminalClientFrame, TerminalOutput, TerminalUpstream, parse_terminal_output};
