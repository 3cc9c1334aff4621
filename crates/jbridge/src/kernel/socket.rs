//! Split halves of a kernel server socket.
//!
//! The read half belongs to exactly one listener. The write half is shared and
//! serialized behind an async mutex.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::debug;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::error::{KernelError, KernelResult};

/// A socket to the kernel server.
pub type KernelSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A data frame received from the kernel server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Frame::Text(text) => text.as_bytes(),
            Frame::Binary(data) => data,
        }
    }
}

/// Read half of a kernel server socket.
pub struct FrameReceiver {
    stream: SplitStream<KernelSocket>,
}

impl FrameReceiver {
    /// Wait for the next data frame.
    ///
    /// Returns `Ok(None)` once the server closes the socket. Control frames are
    /// skipped.
    pub async fn recv(&mut self) -> KernelResult<Option<Frame>> {
        while let Some(msg) = self.stream.next().await {
            match msg {
                Ok(Message::Text(text)) => return Ok(Some(Frame::Text(text.to_string()))),
                Ok(Message::Binary(data)) => return Ok(Some(Frame::Binary(data.to_vec()))),
                Ok(Message::Close(frame)) => {
                    debug!("Kernel server closed socket: {:?}", frame);
                    return Ok(None);
                }
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Err(KernelError::Socket(e.to_string())),
            }
        }
        Ok(None)
    }
}

/// Write half of a kernel server socket.
pub(crate) struct FrameSender {
    sink: Mutex<SplitSink<KernelSocket, Message>>,
}

impl FrameSender {
    pub(crate) async fn send_text(&self, text: String) -> KernelResult<()> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| KernelError::Send(e.to_string()))
    }

    /// Close the socket. Errors mean it is already gone.
    pub(crate) async fn close(&self) {
        if let Err(e) = self.sink.lock().await.close().await {
            debug!("Kernel socket close: {}", e);
        }
    }
}

pub(crate) fn split(socket: KernelSocket) -> (FrameSender, FrameReceiver) {
    let (sink, stream) = socket.split();
    (
        FrameSender {
            sink: Mutex::new(sink),
        },
        FrameReceiver { stream },
    )
}
