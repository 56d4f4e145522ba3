//! Physical duplex socket boundary.
//!
//! A [`Connector`] opens one socket and hands back a [`Connection`]: a pair of
//! channels carrying outbound [`Frame`]s and inbound [`SocketEvent`]s. The
//! session owns the `Connection`; dropping it releases the socket.

use std::time::Duration;

use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use log::debug;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

use crate::error::SessionError;

const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long the reader keeps polling after a close frame so the handshake
/// can complete.
const CLOSE_LINGER: Duration = Duration::from_secs(5);

/// Frame written to the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Begin the closing handshake.
    Close,
}

/// Event read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Text(String),
    Closed { code: Option<u16>, reason: String },
    Error(String),
}

/// An open socket, as seen by the session.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// An in-memory connection and the peer end that drives it.
    pub fn pair() -> (Connection, SocketPeer) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        (
            Connection::new(outbound_tx, inbound_rx),
            SocketPeer {
                frames: outbound_rx,
                events: inbound_tx,
            },
        )
    }

    /// Queue a frame; false once the socket is gone.
    pub(crate) fn send(&self, frame: Frame) -> bool {
        self.outbound.send(frame).is_ok()
    }

    /// Next inbound event. A vanished socket reads as closed.
    pub(crate) async fn recv(&mut self) -> SocketEvent {
        self.inbound
            .recv()
            .await
            .unwrap_or_else(|| SocketEvent::Closed {
                code: None,
                reason: "socket dropped".to_string(),
            })
    }
}

/// The remote end of [`Connection::pair`].
#[derive(Debug)]
pub struct SocketPeer {
    frames: mpsc::UnboundedReceiver<Frame>,
    events: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketPeer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Text(text.into()));
    }

    pub fn close(&self, code: u16, reason: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Closed {
            code: Some(code),
            reason: reason.into(),
        });
    }

    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.events.send(SocketEvent::Error(message.into()));
    }

    /// Next frame written by the session; `None` once it released the socket.
    pub async fn recv_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    pub fn try_recv_frame(&mut self) -> Option<Frame> {
        match self.frames.try_recv() {
            Ok(frame) => Some(frame),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Whether the session has dropped its end of the connection.
    pub fn is_released(&self) -> bool {
        self.events.is_closed()
    }
}

/// Opens physical sockets.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, SessionError>>;
}

/// WebSocket connector over tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WsConnector {
    handshake_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on TCP connect plus the upgrade handshake. Default: 10 seconds
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, SessionError>> {
        let url = url.to_string();
        let handshake_timeout = self.handshake_timeout;

        Box::pin(async move {
            let (ws, _) = tokio::time::timeout(handshake_timeout, connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    SessionError::Connection(format!(
                        "WebSocket handshake timed out after {handshake_timeout:?}"
                    ))
                })?
                .map_err(|e| SessionError::Connection(format!("WebSocket connect failed: {e}")))?;

            let (mut sink, mut stream) = ws.split();
            let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
            let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<SocketEvent>();

            tokio::spawn(async move {
                while let Some(frame) = outbound_rx.recv().await {
                    let (message, closing) = match frame {
                        Frame::Text(text) => (Message::Text(text), false),
                        Frame::Close => (
                            Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "client closing".into(),
                            })),
                            true,
                        ),
                    };
                    if let Err(e) = sink.send(message).await {
                        debug!("WebSocket write failed: {}", e);
                        return;
                    }
                    if closing {
                        return;
                    }
                }
                let _ = sink.close().await;
            });

            tokio::spawn(async move {
                loop {
                    let item = tokio::select! {
                        item = stream.next() => item,
                        _ = inbound_tx.closed() => return,
                    };
                    let event = match item {
                        Some(Ok(Message::Text(text))) => SocketEvent::Text(text),
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (Some(u16::from(f.code)), f.reason.into_owned()))
                                .unwrap_or((None, String::new()));
                            let _ = inbound_tx.send(SocketEvent::Closed { code, reason });
                            // tungstenite writes its close reply on the next poll.
                            let drained = tokio::time::timeout(CLOSE_LINGER, async {
                                while let Some(Ok(_)) = stream.next().await {}
                            })
                            .await;
                            if drained.is_err() {
                                debug!("WebSocket peer did not finish closing within {:?}", CLOSE_LINGER);
                            }
                            return;
                        }
                        // Control frames are answered by tungstenite; binary is not part of the protocol.
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => {
                            let _ = inbound_tx.send(SocketEvent::Error(e.to_string()));
                            return;
                        }
                        None => {
                            let _ = inbound_tx.send(SocketEvent::Closed {
                                code: None,
                                reason: "stream ended".to_string(),
                            });
                            return;
                        }
                    };
                    if inbound_tx.send(event).is_err() {
                        return;
                    }
                }
            });

            Ok(Connection::new(outbound_tx, inbound_rx))
        })
    }
}
