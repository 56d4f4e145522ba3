//! Real-time transport session.
//!
//! [`TransportSession`] keeps one duplex connection to the backend alive for
//! the lifetime of the app: it authenticates the upgrade with the current
//! access token, sends heartbeats, acknowledges delivered messages, and
//! reconnects with linear backoff when the connection drops without
//! [`close`](TransportSession::close) being called.
//!
//! All session state lives in a single driver task; handles talk to it over
//! a command channel and observe it through [`SessionEvents`] and
//! [`SessionStatus`].
//!
//! ## Usage
//!
//! ```ignore
//! use delivery_mp_session::session::{SessionConfig, SessionEvent, TransportSession};
//!
//! let session = TransportSession::websocket(SessionConfig::new("https://api.example.com"), coordinator);
//! let mut events = session.events();
//! session.connect().await?;
//! session.subscribe(["order:42"]);
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::Message(message) = event {
//!         println!("{:?}: {}", message.kind, message.data);
//!     }
//! }
//! ```

mod driver;
mod endpoint;
mod timer;
mod transport;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, Stream};
use log::warn;
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::sync::{mpsc, oneshot, watch};

use crate::error::SessionError;
use crate::token::CredentialCoordinator;
use crate::types::{InboundMessage, OutboundEnvelope};

use driver::{Command, Driver};

pub use endpoint::build_endpoint;
pub use transport::{Connection, Connector, Frame, SocketEvent, SocketPeer, WsConnector};

const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(45);
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(10);
const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Session tuning.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub(crate) base_url: String,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_interval: Duration,
    pub(crate) max_reconnect_attempts: u32,
    pub(crate) stability_window: Duration,
    pub(crate) close_timeout: Duration,
    pub(crate) event_capacity: usize,
}

impl SessionConfig {
    /// `base_url` is the HTTP base of the backend; the socket endpoint is
    /// derived from it at connect time.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            stability_window: DEFAULT_STABILITY_WINDOW,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Interval between outbound pings while open. Default: 45 seconds
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Backoff unit; attempt n waits n times this. Default: 3 seconds
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Default: 5
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// How long a connection must stay open before the attempt counter
    /// resets. Default: 10 seconds
    pub fn stability_window(mut self, window: Duration) -> Self {
        self.stability_window = window;
        self
    }

    /// Upper bound on waiting for a socket to confirm close. Default: 1 second
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Events buffered per subscriber before the slowest one lags. Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

/// Lifecycle state of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: ConnectionState,
    /// Consecutive reconnect attempts since the last stable connection.
    pub reconnect_attempts: u32,
}

/// Something that happened to the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A connection attempt started. `attempt` is 0 for a fresh connect.
    Connecting { attempt: u32 },
    Open,
    /// A recognized inbound message.
    Message(InboundMessage),
    Closed {
        code: Option<u16>,
        reason: String,
        /// Whether the close was requested with [`TransportSession::close`].
        manual: bool,
    },
    Reconnecting { attempt: u32, delay: Duration },
    /// The attempt budget is spent; the session stays closed until the next
    /// explicit connect.
    ReconnectExhausted { attempts: u32 },
    Error(SessionError),
}

/// Receiver side of the session event stream.
#[derive(Debug)]
pub struct SessionEvents {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionEvents {
    /// Next event, or `None` once every session handle is gone. Events missed
    /// by a lagging receiver are skipped.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Session event receiver lagged; skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("Session event receiver lagged; skipped {} events", skipped);
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = SessionEvent> + Send + 'static {
        stream::unfold(self, |mut events| async move {
            events.recv().await.map(|event| (event, events))
        })
    }
}

/// Handle to a real-time session. Cheap to clone; the session shuts down and
/// releases its socket when the last handle is dropped.
#[derive(Clone)]
pub struct TransportSession {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
}

impl fmt::Debug for TransportSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl TransportSession {
    /// Spawn the session driver. Must be called inside a tokio runtime.
    pub fn new(
        config: SessionConfig,
        coordinator: CredentialCoordinator,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(SessionStatus {
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
        });
        let (events, _) = broadcast::channel(config.event_capacity);

        let driver = Driver::new(
            config,
            connector,
            coordinator,
            commands_rx,
            status_tx,
            events.clone(),
        );
        tokio::spawn(driver.run());

        Self {
            commands,
            status,
            events,
        }
    }

    /// Session over a real WebSocket.
    pub fn websocket(config: SessionConfig, coordinator: CredentialCoordinator) -> Self {
        Self::new(config, coordinator, Arc::new(WsConnector::new()))
    }

    /// Start a connection attempt.
    ///
    /// Resolves once the attempt is under way; watch [`events`](Self::events)
    /// for [`SessionEvent::Open`]. A no-op while an attempt is already in
    /// progress. A previous socket is closed first.
    ///
    /// # Errors
    /// - `SessionError::Auth` when no access token is stored
    /// - `SessionError::Config` when the base URL cannot be turned into a
    ///   socket endpoint
    pub async fn connect(&self) -> Result<(), SessionError> {
        let (reply, rx) = oneshot::channel();
        self.command(Command::Connect { reply })?;
        rx.await.map_err(|_| shutdown_error())?
    }

    /// Close the session and suppress reconnection. Bounded by the configured
    /// close timeout even when the peer never confirms.
    pub async fn close(&self) {
        let (reply, rx) = oneshot::channel();
        if self.command(Command::Close { reply }).is_ok() {
            let _ = rx.await;
        }
    }

    /// Queue a message. Dropped with a warning when the session is not open.
    pub fn send(&self, kind: impl Into<String>, data: Value, channel: Option<&str>) {
        self.send_envelope(OutboundEnvelope::new(kind, data, channel));
    }

    pub fn subscribe<I, S>(&self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        self.send_envelope(OutboundEnvelope::subscribe(&channels));
    }

    pub fn unsubscribe<I, S>(&self, channels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        self.send_envelope(OutboundEnvelope::unsubscribe(&channels));
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.borrow().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Subscribe to session events from this point on.
    pub fn events(&self) -> SessionEvents {
        SessionEvents {
            rx: self.events.subscribe(),
        }
    }

    /// Wait until the session reaches `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) -> Result<(), SessionError> {
        let mut status = self.status.clone();
        status
            .wait_for(|s| s.state == state)
            .await
            .map(|_| ())
            .map_err(|_| shutdown_error())
    }

    fn send_envelope(&self, envelope: OutboundEnvelope) {
        if self.command(Command::Send(envelope)).is_err() {
            warn!("Session driver stopped; outbound message dropped");
        }
    }

    fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).map_err(|_| shutdown_error())
    }
}

fn shutdown_error() -> SessionError {
    SessionError::Connection("session driver has stopped".to_string())
}
