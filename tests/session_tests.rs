use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;

use delivery_mp_session::api::AuthApi;
use delivery_mp_session::login::{DeviceInfo, StaticLogin};
use delivery_mp_session::session::{Connection, Connector, Frame, SocketPeer};
use delivery_mp_session::types::AccessToken;
use delivery_mp_session::{
    ApiClient, ConnectionState, CredentialCoordinator, Credentials, MemoryCredentialStore,
    MessageKind, SessionConfig, SessionError, SessionEvent, SessionEvents, TransportSession,
};

const BASE_URL: &str = "http://127.0.0.1:9";

#[derive(Default)]
struct StubConnector {
    calls: AtomicUsize,
    urls: Mutex<Vec<String>>,
    refuse: AtomicBool,
    gate: Option<Arc<Notify>>,
    peers: Mutex<Option<mpsc::UnboundedSender<SocketPeer>>>,
}

impl StubConnector {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<SocketPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            peers: Mutex::new(Some(tx)),
            ..Default::default()
        };
        (Arc::new(connector), rx)
    }

    fn gated(gate: Arc<Notify>) -> (Arc<Self>, mpsc::UnboundedReceiver<SocketPeer>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            gate: Some(gate),
            peers: Mutex::new(Some(tx)),
            ..Default::default()
        };
        (Arc::new(connector), rx)
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Connector for StubConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Connection, SessionError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());

        if self.refuse.load(Ordering::SeqCst) {
            return Box::pin(async { Err(SessionError::Connection("refused".to_string())) });
        }

        let (connection, peer) = Connection::pair();
        if let Some(peers) = self.peers.lock().unwrap().as_ref() {
            let _ = peers.send(peer);
        }
        let gate = self.gate.clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(connection)
        })
    }
}

fn coordinator(token: Option<&str>) -> CredentialCoordinator {
    let client = ApiClient::builder().base_url(BASE_URL).build().unwrap();
    let store = match token {
        Some(token) => MemoryCredentialStore::with_credentials(Credentials::new(
            AccessToken::new(token).unwrap(),
            Utc::now() + chrono::Duration::hours(2),
            Some("rt".to_string()),
        )),
        None => MemoryCredentialStore::new(),
    };
    CredentialCoordinator::new(
        AuthApi::new(client),
        Arc::new(StaticLogin::unavailable(DeviceInfo::new("dev-1", "ios"))),
        Arc::new(store),
    )
}

fn config() -> SessionConfig {
    SessionConfig::new(BASE_URL)
}

async fn next_event(events: &mut SessionEvents) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(600), events.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session event stream ended")
}

async fn wait_for<F>(events: &mut SessionEvents, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    loop {
        let event = next_event(events).await;
        if matches(&event) {
            return event;
        }
    }
}

async fn wait_open(events: &mut SessionEvents) {
    wait_for(events, |e| matches!(e, SessionEvent::Open)).await;
}

async fn next_peer(peers: &mut mpsc::UnboundedReceiver<SocketPeer>) -> SocketPeer {
    tokio::time::timeout(Duration::from_secs(600), peers.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

async fn next_json(peer: &mut SocketPeer) -> Value {
    match tokio::time::timeout(Duration::from_secs(600), peer.recv_frame())
        .await
        .expect("timed out waiting for a frame")
    {
        Some(Frame::Text(text)) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

async fn open_session(
    config: SessionConfig,
) -> (
    TransportSession,
    SessionEvents,
    Arc<StubConnector>,
    SocketPeer,
    mpsc::UnboundedReceiver<SocketPeer>,
) {
    let (connector, mut peers) = StubConnector::new();
    let session = TransportSession::new(config, coordinator(Some("tok-1")), connector.clone());
    let mut events = session.events();

    session.connect().await.unwrap();
    wait_open(&mut events).await;
    let peer = next_peer(&mut peers).await;

    (session, events, connector, peer, peers)
}

#[tokio::test(start_paused = true)]
async fn test_connect_uses_token_endpoint() {
    let (session, mut events, connector, _peer, _peers) = open_session(config()).await;

    assert_eq!(session.state(), ConnectionState::Open);
    assert_eq!(connector.calls(), 1);
    assert_eq!(
        connector.urls.lock().unwrap()[0],
        "ws://127.0.0.1:9/v1/ws?token=tok%2D1"
    );
    assert!(events.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connect_reports_connecting_then_open() {
    let (connector, _peers) = StubConnector::new();
    let session = TransportSession::new(config(), coordinator(Some("tok")), connector);
    let mut events = session.events();

    assert_eq!(session.state(), ConnectionState::Idle);
    session.connect().await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Connecting { attempt: 0 }
    ));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Open));
    assert!(session.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_connect_is_noop_while_connecting() {
    let gate = Arc::new(Notify::new());
    let (connector, _peers) = StubConnector::gated(gate.clone());
    let session = TransportSession::new(config(), coordinator(Some("tok")), connector.clone());
    let mut events = session.events();

    session.connect().await.unwrap();
    session.connect().await.unwrap();
    session.connect().await.unwrap();

    assert_eq!(session.state(), ConnectionState::Connecting);
    assert_eq!(connector.calls(), 1);

    gate.notify_one();
    wait_open(&mut events).await;
    assert_eq!(connector.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_without_token_fails() {
    let (connector, _peers) = StubConnector::new();
    let session = TransportSession::new(config(), coordinator(None), connector.clone());

    let err = session.connect().await.unwrap_err();

    assert!(err.is_auth());
    assert_eq!(connector.calls(), 0);
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_backoff_is_linear_and_exhausts() {
    let config = config()
        .reconnect_interval(Duration::from_secs(3))
        .max_reconnect_attempts(3);
    let (session, mut events, connector, peer, _peers) = open_session(config).await;

    connector.refuse.store(true, Ordering::SeqCst);
    peer.close(1006, "abnormal");

    let mut delays = Vec::new();
    let mut connecting_at = Vec::new();
    let dropped_at = Instant::now();
    loop {
        match next_event(&mut events).await {
            SessionEvent::Reconnecting { attempt, delay } => {
                assert_eq!(attempt as usize, delays.len() + 1);
                delays.push(delay);
            }
            SessionEvent::Connecting { attempt } => {
                connecting_at.push((attempt, dropped_at.elapsed()));
            }
            SessionEvent::ReconnectExhausted { attempts } => {
                assert_eq!(attempts, 3);
                break;
            }
            SessionEvent::Open => panic!("refused connection must not open"),
            _ => {}
        }
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_secs(3),
            Duration::from_secs(6),
            Duration::from_secs(9)
        ]
    );
    assert_eq!(
        connecting_at,
        vec![
            (1, Duration::from_secs(3)),
            (2, Duration::from_secs(9)),
            (3, Duration::from_secs(18)),
        ]
    );
    assert_eq!(connector.calls(), 4);

    let exhausted = next_event(&mut events).await;
    assert!(matches!(exhausted, SessionEvent::Error(SessionError::Connection(_))));

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(connector.calls(), 4);
    assert_eq!(session.state(), ConnectionState::Closed);

    // An explicit connect starts over with a fresh budget.
    connector.refuse.store(false, Ordering::SeqCst);
    session.connect().await.unwrap();
    wait_open(&mut events).await;
    assert_eq!(session.status().reconnect_attempts, 0);
}

#[tokio::test(start_paused = true)]
async fn test_short_open_close_cycles_exhaust_budget() {
    let config = config().max_reconnect_attempts(3);
    let (session, mut events, connector, mut peer, mut peers) = open_session(config).await;

    for cycle in 1..=3u32 {
        peer.close(1006, "flap");
        let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
        assert!(matches!(event, SessionEvent::Reconnecting { attempt, .. } if attempt == cycle));
        wait_open(&mut events).await;
        peer = next_peer(&mut peers).await;
        assert_eq!(session.status().reconnect_attempts, cycle);
    }

    peer.close(1006, "flap");
    let event = wait_for(&mut events, |e| {
        matches!(
            e,
            SessionEvent::Reconnecting { .. } | SessionEvent::ReconnectExhausted { .. }
        )
    })
    .await;
    assert!(matches!(event, SessionEvent::ReconnectExhausted { attempts: 3 }));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_stable_connection_resets_attempts() {
    let (session, mut events, _connector, peer, mut peers) = open_session(config()).await;

    peer.close(1006, "dropped");
    let first = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    assert!(matches!(
        first,
        SessionEvent::Reconnecting { attempt: 1, delay } if delay == Duration::from_secs(3)
    ));

    wait_open(&mut events).await;
    let peer = next_peer(&mut peers).await;
    assert_eq!(session.status().reconnect_attempts, 1);

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(session.status().reconnect_attempts, 0);

    peer.close(1006, "dropped again");
    let second = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    assert!(matches!(
        second,
        SessionEvent::Reconnecting { attempt: 1, delay } if delay == Duration::from_secs(3)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_unstable_connection_keeps_counting() {
    let (_session, mut events, _connector, peer, mut peers) = open_session(config()).await;

    peer.close(1006, "dropped");
    wait_open(&mut events).await;
    let peer = next_peer(&mut peers).await;

    tokio::time::sleep(Duration::from_secs(5)).await;
    peer.close(1006, "dropped before stable");

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Reconnecting { .. })).await;
    assert!(matches!(
        event,
        SessionEvent::Reconnecting { attempt: 2, delay } if delay == Duration::from_secs(6)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_connect_attempt_schedules_reconnect() {
    let (connector, _peers) = StubConnector::new();
    connector.refuse.store(true, Ordering::SeqCst);
    let session = TransportSession::new(config(), coordinator(Some("tok")), connector.clone());
    let mut events = session.events();

    session.connect().await.unwrap();

    assert!(matches!(
        wait_for(&mut events, |e| matches!(e, SessionEvent::Error(_))).await,
        SessionEvent::Error(SessionError::Connection(_))
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Closed { manual: false, .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1, .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_without_token_stops() {
    let (connector, mut peers) = StubConnector::new();
    let coordinator = coordinator(Some("tok"));
    let session = TransportSession::new(config(), coordinator.clone(), connector.clone());
    let mut events = session.events();

    session.connect().await.unwrap();
    wait_open(&mut events).await;
    let peer = next_peer(&mut peers).await;

    coordinator.logout();
    peer.close(1006, "dropped");

    let event = wait_for(&mut events, |e| matches!(e, SessionEvent::Error(_))).await;
    assert!(matches!(event, SessionEvent::Error(SessionError::Auth(_))));
    assert_eq!(connector.calls(), 1);

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.calls(), 1);
    assert_eq!(session.state(), ConnectionState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_inbound_ping_gets_pong_without_dispatch() {
    let (_session, mut events, _connector, mut peer, _peers) = open_session(config()).await;

    peer.send_text(r#"{"type":"ping"}"#);
    let pong = next_json(&mut peer).await;
    assert_eq!(pong["type"], "pong");
    assert!(pong["data"]["timestamp"].is_i64());

    peer.send_text(r#"{"type":"notification","data":{"title":"hi"}}"#);
    match wait_for(&mut events, |e| matches!(e, SessionEvent::Message(_))).await {
        SessionEvent::Message(message) => assert_eq!(message.kind, MessageKind::Notification),
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_message_id_is_acked_and_dispatched() {
    let (_session, mut events, _connector, mut peer, _peers) = open_session(config()).await;

    peer.send_text(
        r#"{"type":"order_status","data":{"order_id":"A1","status":"delivering"},"message_id":"m-1"}"#,
    );

    let ack = next_json(&mut peer).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["data"]["message_id"], "m-1");

    match wait_for(&mut events, |e| matches!(e, SessionEvent::Message(_))).await {
        SessionEvent::Message(message) => {
            assert_eq!(message.kind, MessageKind::OrderStatus);
            assert_eq!(message.data["status"], "delivering");
            assert_eq!(message.message_id.as_deref(), Some("m-1"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_ping_with_message_id_is_acked_then_ponged() {
    let (_session, mut events, _connector, mut peer, _peers) = open_session(config()).await;

    peer.send_text(r#"{"type":"ping","message_id":"m-2"}"#);

    assert_eq!(next_json(&mut peer).await["type"], "ack");
    assert_eq!(next_json(&mut peer).await["type"], "pong");

    tokio::time::sleep(Duration::from_secs(1)).await;
    while let Some(event) = events.try_recv() {
        assert!(!matches!(event, SessionEvent::Message(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_malformed_and_unknown_messages_are_dropped() {
    let (session, mut events, _connector, peer, _peers) = open_session(config()).await;

    peer.send_text("not json at all");
    peer.send_text(r#"{"data":{}}"#);
    peer.send_text(r#"{"type":"mystery","data":{}}"#);
    peer.send_text(r#"{"type":"chat_message","data":{"text":"hello"}}"#);

    match wait_for(&mut events, |e| matches!(e, SessionEvent::Message(_))).await {
        SessionEvent::Message(message) => {
            assert_eq!(message.kind, MessageKind::ChatMessage);
            assert_eq!(message.data["text"], "hello");
        }
        _ => unreachable!(),
    }
    assert!(session.is_open());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_pings_while_open() {
    let (_session, _events, _connector, mut peer, _peers) = open_session(config()).await;

    tokio::time::sleep(Duration::from_secs(44)).await;
    assert!(peer.try_recv_frame().is_none());

    tokio::time::sleep(Duration::from_secs(2)).await;
    match peer.try_recv_frame() {
        Some(Frame::Text(text)) => {
            let ping: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(ping["type"], "ping");
            assert_eq!(ping["channel"], "default");
        }
        other => panic!("expected a ping, got {other:?}"),
    }

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(matches!(peer.try_recv_frame(), Some(Frame::Text(_))));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_restarts_with_each_connection() {
    let (_session, mut events, _connector, mut peer, mut peers) = open_session(config()).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(peer.try_recv_frame().is_none());
    peer.close(1006, "abnormal");

    wait_open(&mut events).await;
    let reopened_at = Instant::now();
    let mut peer = next_peer(&mut peers).await;

    // The first connection's cadence would have pinged 12 s after the reopen.
    tokio::time::sleep(Duration::from_secs(44)).await;
    assert!(peer.try_recv_frame().is_none());

    let ping = next_json(&mut peer).await;
    assert_eq!(ping["type"], "ping");
    assert_eq!(reopened_at.elapsed(), Duration::from_secs(45));
}

#[tokio::test(start_paused = true)]
async fn test_send_while_open_wraps_envelope() {
    let (session, _events, _connector, mut peer, _peers) = open_session(config()).await;

    session.send("chat", json!({"text": "on my way"}), Some("order:A1"));

    let frame = next_json(&mut peer).await;
    assert_eq!(frame["type"], "chat");
    assert_eq!(frame["channel"], "order:A1");
    assert_eq!(frame["data"]["text"], "on my way");
    assert!(frame["timestamp"].is_string());
    assert!(frame["message_id"].as_str().unwrap().contains('_'));
}

#[tokio::test(start_paused = true)]
async fn test_send_while_disconnected_is_dropped() {
    let (connector, mut peers) = StubConnector::new();
    let session = TransportSession::new(config(), coordinator(Some("tok")), connector);
    let mut events = session.events();

    session.send("chat", json!({"text": "lost"}), None);
    session.connect().await.unwrap();
    wait_open(&mut events).await;

    let mut peer = next_peer(&mut peers).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(peer.try_recv_frame().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_and_unsubscribe_frames() {
    let (session, _events, _connector, mut peer, _peers) = open_session(config()).await;

    session.subscribe(["order:A1", "rider:9"]);
    session.unsubscribe(vec!["rider:9".to_string()]);

    let subscribe = next_json(&mut peer).await;
    assert_eq!(subscribe["type"], "subscribe");
    assert_eq!(subscribe["data"]["channels"], json!(["order:A1", "rider:9"]));

    let unsubscribe = next_json(&mut peer).await;
    assert_eq!(unsubscribe["type"], "unsubscribe");
    assert_eq!(unsubscribe["data"]["channels"], json!(["rider:9"]));
}

#[tokio::test(start_paused = true)]
async fn test_close_is_bounded_when_peer_is_silent() {
    let (session, mut events, connector, mut peer, _peers) = open_session(config()).await;

    let start = Instant::now();
    session.close().await;

    assert!(start.elapsed() <= Duration::from_secs(1));
    assert_eq!(session.state(), ConnectionState::Closed);
    assert_eq!(peer.recv_frame().await, Some(Frame::Close));
    assert!(peer.is_released());
    assert!(matches!(
        wait_for(&mut events, |e| matches!(e, SessionEvent::Closed { .. })).await,
        SessionEvent::Closed { manual: true, .. }
    ));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_close_completes_when_peer_confirms() {
    let (session, _events, _connector, mut peer, _peers) = open_session(config()).await;

    let responder = tokio::spawn(async move {
        assert_eq!(peer.recv_frame().await, Some(Frame::Close));
        peer.close(1000, "bye");
        peer
    });

    let start = Instant::now();
    session.close().await;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(session.state(), ConnectionState::Closed);
    assert!(responder.await.unwrap().is_released());
}

#[tokio::test(start_paused = true)]
async fn test_manual_close_suppresses_reconnect() {
    let (session, mut events, connector, peer, _peers) = open_session(config()).await;

    session.close().await;
    peer.close(1006, "late close");

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.calls(), 1);
    while let Some(event) = events.try_recv() {
        assert!(!matches!(event, SessionEvent::Reconnecting { .. }));
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_drains_previous_socket() {
    let (session, mut events, connector, mut old_peer, mut peers) = open_session(config()).await;

    let responder = tokio::spawn(async move {
        assert_eq!(old_peer.recv_frame().await, Some(Frame::Close));
        old_peer.close(1000, "replaced");
        old_peer
    });

    session.connect().await.unwrap();
    wait_open(&mut events).await;
    let _new_peer = next_peer(&mut peers).await;

    assert_eq!(connector.calls(), 2);
    let old_peer = responder.await.unwrap();
    assert!(old_peer.is_released());

    // A message on the superseded socket goes nowhere.
    old_peer.send_text(r#"{"type":"notification","data":{}}"#);
    tokio::time::sleep(Duration::from_secs(1)).await;
    while let Some(event) = events.try_recv() {
        assert!(!matches!(event, SessionEvent::Message(_)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_replacing_open_socket_reports_close_first() {
    let (session, mut events, _connector, _old_peer, mut peers) = open_session(config()).await;

    session.connect().await.unwrap();

    match next_event(&mut events).await {
        SessionEvent::Closed {
            code,
            reason,
            manual,
        } => {
            assert_eq!(code, None);
            assert_eq!(reason, "replaced");
            assert!(manual);
        }
        other => panic!("expected Closed, got {other:?}"),
    }
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Connecting { attempt: 0 }
    ));
    assert!(matches!(next_event(&mut events).await, SessionEvent::Open));
    let _new_peer = next_peer(&mut peers).await;
}

#[tokio::test(start_paused = true)]
async fn test_reconnecting_open_session_without_token_reports_failure() {
    let (connector, mut peers) = StubConnector::new();
    let coordinator = coordinator(Some("tok"));
    let session = TransportSession::new(config(), coordinator.clone(), connector.clone());
    let mut events = session.events();

    session.connect().await.unwrap();
    wait_open(&mut events).await;
    let _peer = next_peer(&mut peers).await;

    coordinator.logout();
    let err = session.connect().await.unwrap_err();
    assert!(err.is_auth());
    assert_eq!(session.state(), ConnectionState::Closed);

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Closed {
            code: None,
            manual: true,
            ..
        }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Error(SessionError::Auth(_))
    ));
    assert!(events.try_recv().is_none());

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(connector.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_last_handle_releases_socket() {
    let (session, mut events, _connector, mut peer, _peers) = open_session(config()).await;

    let clone = session.clone();
    drop(session);
    assert!(clone.is_open());
    drop(clone);

    assert_eq!(peer.recv_frame().await, Some(Frame::Close));
    assert_eq!(peer.recv_frame().await, None);
    assert!(peer.is_released());

    loop {
        if events.recv().await.is_none() {
            break;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_state() {
    let (connector, _peers) = StubConnector::new();
    let session = TransportSession::new(config(), coordinator(Some("tok")), connector);

    session.connect().await.unwrap();
    session.wait_for_state(ConnectionState::Open).await.unwrap();
    assert!(session.is_open());
}
