//! The task that owns a session's socket and timers.
//!
//! Commands from [`TransportSession`](super::TransportSession) handles, socket
//! events, connect results and timer expiries are handled one at a time in a
//! single select loop, so no two of them ever interleave.

use std::sync::Arc;

use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::endpoint::build_endpoint;
use super::timer::{Ticker, Timer};
use super::transport::{Connection, Connector, Frame, SocketEvent};
use super::{ConnectionState, SessionConfig, SessionEvent, SessionStatus};
use crate::error::SessionError;
use crate::middleware::redact_url;
use crate::token::CredentialCoordinator;
use crate::types::{InboundEnvelope, InboundMessage, MessageKind, OutboundEnvelope};

type PendingConnect = BoxFuture<'static, Result<Connection, SessionError>>;

pub(super) enum Command {
    Connect {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Send(OutboundEnvelope),
}

pub(super) struct Driver {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    coordinator: CredentialCoordinator,
    commands: mpsc::UnboundedReceiver<Command>,
    status: watch::Sender<SessionStatus>,
    events: broadcast::Sender<SessionEvent>,
    state: ConnectionState,
    attempts: u32,
    manual_close: bool,
    socket: Option<Connection>,
    pending: Option<PendingConnect>,
    heartbeat: Ticker,
    stability: Timer,
    reconnect: Timer,
}

impl Driver {
    pub(super) fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        coordinator: CredentialCoordinator,
        commands: mpsc::UnboundedReceiver<Command>,
        status: watch::Sender<SessionStatus>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            coordinator,
            commands,
            status,
            events,
            state: ConnectionState::Idle,
            attempts: 0,
            manual_close: false,
            socket: None,
            pending: None,
            heartbeat: Ticker::default(),
            stability: Timer::default(),
            reconnect: Timer::default(),
        }
    }

    pub(super) async fn run(mut self) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                result = poll_pending(&mut self.pending), if self.pending.is_some() => {
                    self.pending = None;
                    self.on_connect_result(result);
                }
                event = recv_socket(&mut self.socket), if self.socket.is_some() => {
                    self.on_socket_event(event);
                }
                _ = self.heartbeat.tick() => {
                    self.transmit(OutboundEnvelope::ping());
                }
                _ = self.stability.fired() => {
                    self.on_stable();
                }
                _ = self.reconnect.fired() => {
                    self.on_reconnect_due().await;
                }
            }
        }

        debug!("All session handles dropped; shutting down");
        self.manual_close = true;
        self.release_all().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect { reply } => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                self.close().await;
                let _ = reply.send(());
            }
            Command::Send(envelope) => {
                if self.state == ConnectionState::Open && self.socket.is_some() {
                    self.transmit(envelope);
                } else {
                    warn!(
                        "Not connected ({}); dropping outbound '{}' message",
                        self.state, envelope.kind
                    );
                }
            }
        }
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        if self.state == ConnectionState::Connecting {
            debug!("Connect ignored: a connection attempt is already in progress");
            return Ok(());
        }

        if self.manual_close || self.attempts >= self.config.max_reconnect_attempts {
            self.attempts = 0;
        }
        self.manual_close = false;
        self.reconnect.cancel();

        self.open_socket().await
    }

    /// Drain any previous socket, then start one connection attempt.
    ///
    /// Subscribers always hear about the outcome: a replaced socket is
    /// reported as a manual `Closed`, and a failed attempt as `Error`.
    async fn open_socket(&mut self) -> Result<(), SessionError> {
        if let Some(socket) = self.socket.take() {
            self.stop_open_timers();
            self.drain(socket).await;
            self.emit(SessionEvent::Closed {
                code: None,
                reason: "replaced".to_string(),
                manual: true,
            });
        }

        let result = self.begin_attempt();
        if let Err(e) = &result {
            self.set_state(ConnectionState::Closed);
            self.emit(SessionEvent::Error(e.clone()));
        }
        result
    }

    fn begin_attempt(&mut self) -> Result<(), SessionError> {
        let token = self.coordinator.current_access_token().ok_or_else(|| {
            SessionError::Auth("no access token available; log in before connecting".to_string())
        })?;
        let url = build_endpoint(&self.config.base_url, &token)?;

        info!("Connecting to {}", redact_url(&url));
        self.pending = Some(self.connector.connect(&url));
        self.set_state(ConnectionState::Connecting);
        self.emit(SessionEvent::Connecting {
            attempt: self.attempts,
        });
        Ok(())
    }

    async fn close(&mut self) {
        self.manual_close = true;
        self.reconnect.cancel();
        if self.pending.take().is_some() {
            debug!("Abandoned in-flight connection attempt");
        }

        let was_active = matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        );
        self.release_all().await;

        if was_active {
            info!("Session closed by client");
            self.emit(SessionEvent::Closed {
                code: None,
                reason: "closed by client".to_string(),
                manual: true,
            });
        }
    }

    async fn release_all(&mut self) {
        self.pending = None;
        self.reconnect.cancel();
        self.stop_open_timers();
        if let Some(socket) = self.socket.take() {
            self.drain(socket).await;
        }
        self.set_state(ConnectionState::Closed);
    }

    /// Ask the socket to close and wait, within `close_timeout`, for it to
    /// confirm. The socket is released either way.
    async fn drain(&mut self, mut socket: Connection) {
        self.set_state(ConnectionState::Closing);
        socket.send(Frame::Close);

        let timeout = self.config.close_timeout;
        let acknowledged = tokio::time::timeout(timeout, async {
            loop {
                match socket.recv().await {
                    SocketEvent::Text(_) => continue,
                    SocketEvent::Closed { .. } | SocketEvent::Error(_) => break,
                }
            }
        })
        .await
        .is_ok();

        if !acknowledged {
            warn!(
                "Socket did not confirm close within {:?}; releasing it",
                timeout
            );
        }
    }

    fn on_connect_result(&mut self, result: Result<Connection, SessionError>) {
        match result {
            Ok(socket) => {
                self.socket = Some(socket);
                self.set_state(ConnectionState::Open);
                self.heartbeat.start(self.config.heartbeat_interval);
                self.stability.arm(self.config.stability_window);
                info!("Session open");
                self.emit(SessionEvent::Open);
            }
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                self.emit(SessionEvent::Error(e));
                self.on_disconnected(None, "connection attempt failed".to_string());
            }
        }
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        match event {
            SocketEvent::Text(payload) => self.dispatch(&payload),
            SocketEvent::Closed { code, reason } => {
                self.socket = None;
                info!("Socket closed (code={:?}, reason={:?})", code, reason);
                self.on_disconnected(code, reason);
            }
            SocketEvent::Error(message) => {
                self.socket = None;
                warn!("Socket error: {}", message);
                self.emit(SessionEvent::Error(SessionError::Connection(message.clone())));
                self.on_disconnected(None, message);
            }
        }
    }

    fn on_disconnected(&mut self, code: Option<u16>, reason: String) {
        self.stop_open_timers();
        self.set_state(ConnectionState::Closed);
        self.emit(SessionEvent::Closed {
            code,
            reason,
            manual: false,
        });

        if !self.manual_close {
            self.schedule_reconnect();
        }
    }

    /// Linear backoff: the n-th consecutive attempt waits `n × reconnect_interval`.
    fn schedule_reconnect(&mut self) {
        let max = self.config.max_reconnect_attempts;
        if self.attempts >= max {
            error!("Reconnect attempts exhausted ({}/{})", self.attempts, max);
            self.emit(SessionEvent::ReconnectExhausted {
                attempts: self.attempts,
            });
            self.emit(SessionEvent::Error(SessionError::Connection(format!(
                "reconnect attempts exhausted after {} attempts",
                self.attempts
            ))));
            return;
        }

        self.attempts += 1;
        let delay = self.config.reconnect_interval.saturating_mul(self.attempts);
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, self.attempts, max
        );
        self.reconnect.arm(delay);
        self.publish_status();
        self.emit(SessionEvent::Reconnecting {
            attempt: self.attempts,
            delay,
        });
    }

    async fn on_reconnect_due(&mut self) {
        if self.manual_close {
            return;
        }
        if let Err(e) = self.open_socket().await {
            error!("Reconnect aborted: {}", e);
        }
    }

    fn on_stable(&mut self) {
        if self.attempts > 0 {
            info!(
                "Connection stable for {:?}; resetting reconnect attempts",
                self.config.stability_window
            );
        }
        self.attempts = 0;
        self.publish_status();
    }

    fn dispatch(&mut self, payload: &str) {
        let envelope: InboundEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                let error = SessionError::Protocol(format!("unparsable inbound payload: {e}"));
                warn!("Dropping message: {}", error);
                return;
            }
        };

        if let Some(message_id) = envelope.message_id.as_deref() {
            self.transmit(OutboundEnvelope::ack(message_id));
        }

        if envelope.kind == "ping" {
            self.transmit(OutboundEnvelope::pong());
            return;
        }

        match MessageKind::parse(&envelope.kind) {
            Some(kind) => {
                debug!("Dispatching '{}' message", kind.as_str());
                self.emit(SessionEvent::Message(InboundMessage {
                    kind,
                    data: envelope.data.unwrap_or(Value::Null),
                    message_id: envelope.message_id,
                }));
            }
            None => info!("Ignoring message of unrecognized type '{}'", envelope.kind),
        }
    }

    fn transmit(&mut self, envelope: OutboundEnvelope) {
        let Some(socket) = self.socket.as_ref() else {
            warn!("No socket; dropping outbound '{}' message", envelope.kind);
            return;
        };
        match serde_json::to_string(&envelope) {
            Ok(text) => {
                if !socket.send(Frame::Text(text)) {
                    debug!("Socket gone; '{}' message not sent", envelope.kind);
                }
            }
            Err(e) => error!("Failed to encode '{}' message: {}", envelope.kind, e),
        }
    }

    fn stop_open_timers(&mut self) {
        self.heartbeat.stop();
        self.stability.cancel();
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!("Session state {} -> {}", self.state, state);
        }
        self.state = state;
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.send_replace(SessionStatus {
            state: self.state,
            reconnect_attempts: self.attempts,
        });
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

async fn poll_pending(pending: &mut Option<PendingConnect>) -> Result<Connection, SessionError> {
    match pending.as_mut() {
        Some(future) => future.await,
        None => std::future::pending().await,
    }
}

async fn recv_socket(socket: &mut Option<Connection>) -> SocketEvent {
    match socket.as_mut() {
        Some(socket) => socket.recv().await,
        None => std::future::pending().await,
    }
}
