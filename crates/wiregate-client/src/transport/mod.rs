//! Socket transport
//!
//! Owns the physical gateway connection: dialing, the bounded-concurrency
//! read/dispatch path, the single writer, and graceful shutdown.

mod ws;

pub use ws::{WsClient, WsConfig};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Handler invoked for every inbound binary frame
///
/// Implementations run on pool workers; cross-frame ordering is not
/// guaranteed, so any ordering-sensitive state must carry its own lock.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    async fn handle_frame(&self, frame: Vec<u8>, outbound: &Outbound);
}

/// Sending half of the outbound queue
///
/// Frames are queued here and written to the socket serially by the
/// single writer; the socket forbids concurrent writers.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Message>,
}

impl Outbound {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self { tx }
    }

    /// Queue a raw websocket message
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::QueueClosed)
    }

    /// Queue an encoded envelope as a binary frame
    pub async fn send_binary(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.send(Message::Binary(frame)).await
    }
}

impl std::fmt::Debug for Outbound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbound").finish()
    }
}

/// Transport-level errors
///
/// Read/write failures are fatal to the connection; they trigger the
/// graceful-shutdown path rather than being retried here.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("gateway url not set")]
    NoGateway,

    #[error("no frame handler registered")]
    NoHandler,

    #[error("not connected")]
    NotConnected,

    #[error("transport already running")]
    AlreadyRunning,

    #[error("bot token is not a valid header value")]
    InvalidToken,

    #[error("outbound queue closed")]
    QueueClosed,

    #[error("websocket error: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),
}
