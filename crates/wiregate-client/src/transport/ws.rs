//! Websocket client
//!
//! One reader, one writer, and a semaphore-bounded worker pool. The reader
//! never blocks on frame processing: each binary frame is handed to a
//! spawned worker once a pool permit is acquired, so a saturated pool
//! applies backpressure at the socket instead of growing an unbounded
//! queue. All shutdown paths converge on a shared cancellation token.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{FrameHandler, Outbound, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Transport tuning knobs
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Maximum frames processed concurrently
    pub num_workers: usize,
    /// Outbound queue depth before senders block
    pub outbound_capacity: usize,
    /// How long the writer drains queued frames after shutdown begins
    pub drain_grace: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            num_workers: 20,
            outbound_capacity: 64,
            drain_grace: Duration::from_secs(5),
        }
    }
}

/// Persistent gateway websocket connection
pub struct WsClient {
    config: WsConfig,
    gateway_url: parking_lot::Mutex<Option<String>>,
    handler: parking_lot::Mutex<Option<Arc<dyn FrameHandler>>>,
    stream: tokio::sync::Mutex<Option<WsStream>>,
    outbound_tx: mpsc::Sender<Message>,
    outbound_rx: tokio::sync::Mutex<Option<mpsc::Receiver<Message>>>,
    shutdown: CancellationToken,
}

impl WsClient {
    #[must_use]
    pub fn new(config: WsConfig, shutdown: CancellationToken) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_capacity);

        Self {
            config,
            gateway_url: parking_lot::Mutex::new(None),
            handler: parking_lot::Mutex::new(None),
            stream: tokio::sync::Mutex::new(None),
            outbound_tx,
            outbound_rx: tokio::sync::Mutex::new(Some(outbound_rx)),
            shutdown,
        }
    }

    /// Set the gateway url to dial
    pub fn set_gateway(&self, url: impl Into<String>) {
        *self.gateway_url.lock() = Some(url.into());
    }

    /// Register the handler invoked for each inbound binary frame
    pub fn set_handler(&self, handler: Arc<dyn FrameHandler>) {
        *self.handler.lock() = Some(handler);
    }

    /// Sending half of the outbound queue
    #[must_use]
    pub fn outbound(&self) -> Outbound {
        Outbound::new(self.outbound_tx.clone())
    }

    /// Dial the configured gateway url with bot authorization
    pub async fn connect(&self, token: &str) -> Result<(), TransportError> {
        let url = self
            .gateway_url
            .lock()
            .clone()
            .ok_or(TransportError::NoGateway)?;

        let mut request = url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&format!("Bot {token}"))
            .map_err(|_| TransportError::InvalidToken)?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let started = std::time::Instant::now();
        let (stream, response) = connect_async(request).await?;
        debug!(
            status = %response.status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gateway dial complete"
        );

        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    /// Drive the connection until shutdown
    ///
    /// Splits the socket, spawns the writer, and runs the reader on the
    /// calling task. Returns only after the reader has exited, every
    /// in-flight worker has finished, and the writer has drained and sent
    /// its close frame.
    pub async fn run(&self) -> Result<(), TransportError> {
        let stream = self
            .stream
            .lock()
            .await
            .take()
            .ok_or(TransportError::NotConnected)?;
        let handler = self
            .handler
            .lock()
            .clone()
            .ok_or(TransportError::NoHandler)?;
        let queue = self
            .outbound_rx
            .lock()
            .await
            .take()
            .ok_or(TransportError::AlreadyRunning)?;

        let (sink, source) = stream.split();
        let writer = tokio::spawn(write_loop(
            sink,
            queue,
            self.shutdown.clone(),
            self.config.drain_grace,
        ));

        let permits = Arc::new(Semaphore::new(self.config.num_workers));
        read_loop(source, handler, self.outbound(), permits, self.shutdown.clone()).await;

        if writer.await.is_err() {
            warn!("writer task panicked");
        }

        info!("connection fully drained");
        Ok(())
    }

    /// Begin graceful shutdown
    ///
    /// Safe to call from any task, any number of times; `run` unwinds
    /// once and then returns.
    pub fn close(&self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for WsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsClient")
            .field("config", &self.config)
            .field("gateway_url", &*self.gateway_url.lock())
            .finish_non_exhaustive()
    }
}

/// Reader half: receive frames and fan them out to bounded workers
///
/// Generic over the stream so tests can drive it without a socket.
pub(crate) async fn read_loop<S>(
    mut source: S,
    handler: Arc<dyn FrameHandler>,
    outbound: Outbound,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
) where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let mut workers = JoinSet::new();

    loop {
        let next = tokio::select! {
            () = shutdown.cancelled() => break,
            next = source.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(error)) => {
                warn!(%error, "read error, closing connection");
                shutdown.cancel();
                break;
            }
            None => {
                debug!("socket stream ended");
                shutdown.cancel();
                break;
            }
        };

        match message {
            Message::Binary(frame) => {
                // Saturated pool stalls the reader here; that is the
                // backpressure point for the whole inbound path.
                let permit = tokio::select! {
                    () = shutdown.cancelled() => break,
                    permit = Arc::clone(&permits).acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                let handler = Arc::clone(&handler);
                let outbound = outbound.clone();
                workers.spawn(async move {
                    handler.handle_frame(frame, &outbound).await;
                    drop(permit);
                });

                // Reap finished workers so the set stays small.
                while workers.try_join_next().is_some() {}
            }
            Message::Ping(data) => {
                if outbound.send(Message::Pong(data)).await.is_err() {
                    break;
                }
            }
            Message::Close(frame) => {
                info!(?frame, "server closed the connection");
                shutdown.cancel();
                break;
            }
            Message::Text(text) => {
                debug!(len = text.len(), "ignoring unexpected text frame");
            }
            Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    // No new work starts after cancellation; in-flight workers finish.
    while workers.join_next().await.is_some() {}
}

/// Writer half: drain the outbound queue serially
///
/// After shutdown begins, already-queued frames are flushed within the
/// grace window, then exactly one close frame is written. A send that
/// fails or times out mid-frame leaves the sink in an unknown framing
/// state, so the close frame is skipped on that path.
pub(crate) async fn write_loop<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    shutdown: CancellationToken,
    grace: Duration,
) where
    S: Sink<Message, Error = WsError> + Unpin,
{
    let mut sink_usable = loop {
        tokio::select! {
            () = shutdown.cancelled() => break true,
            next = queue.recv() => match next {
                Some(message) => {
                    if let Err(error) = sink.send(message).await {
                        warn!(%error, "write error, closing connection");
                        shutdown.cancel();
                        break false;
                    }
                }
                None => break true,
            }
        }
    };

    if sink_usable {
        let deadline = Instant::now() + grace;
        while let Ok(message) = queue.try_recv() {
            match tokio::time::timeout_at(deadline, sink.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    debug!(%error, "dropping queued frames after write error");
                    sink_usable = false;
                    break;
                }
                Err(_) => {
                    debug!("drain grace expired mid-frame");
                    sink_usable = false;
                    break;
                }
            }
        }
    }

    if sink_usable {
        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        if let Err(error) = sink.send(close).await {
            debug!(%error, "close frame not delivered");
        }
    }
}
