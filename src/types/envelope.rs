//! Wire envelopes of the real-time channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::{message_id, now_millis, now_rfc3339};

pub const DEFAULT_CHANNEL: &str = "default";

/// Client to server envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub channel: String,
    pub data: Value,
    pub timestamp: String,
    pub message_id: String,
}

impl OutboundEnvelope {
    pub fn new(kind: impl Into<String>, data: Value, channel: Option<&str>) -> Self {
        Self {
            kind: kind.into(),
            channel: channel.unwrap_or(DEFAULT_CHANNEL).to_string(),
            data,
            timestamp: now_rfc3339(),
            message_id: message_id(),
        }
    }

    pub(crate) fn ping() -> Self {
        Self::new("ping", Value::Null, None)
    }

    pub(crate) fn pong() -> Self {
        Self::new("pong", serde_json::json!({ "timestamp": now_millis() }), None)
    }

    pub(crate) fn ack(message_id: &str) -> Self {
        Self::new("ack", serde_json::json!({ "message_id": message_id }), None)
    }

    pub(crate) fn subscribe(channels: &[String]) -> Self {
        Self::new("subscribe", serde_json::json!({ "channels": channels }), None)
    }

    pub(crate) fn unsubscribe(channels: &[String]) -> Self {
        Self::new("unsubscribe", serde_json::json!({ "channels": channels }), None)
    }
}

/// Server to client envelope.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Inbound message types the client dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    OrderStatus,
    RiderLocation,
    Notification,
    ChatMessage,
    Subscribed,
    Unsubscribed,
    Pong,
    Error,
}

impl MessageKind {
    pub fn parse(kind: &str) -> Option<Self> {
        let kind = match kind {
            "order_status" => MessageKind::OrderStatus,
            "rider_location" => MessageKind::RiderLocation,
            "notification" => MessageKind::Notification,
            "chat_message" => MessageKind::ChatMessage,
            "subscribed" => MessageKind::Subscribed,
            "unsubscribed" => MessageKind::Unsubscribed,
            "pong" => MessageKind::Pong,
            "error" => MessageKind::Error,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::OrderStatus => "order_status",
            MessageKind::RiderLocation => "rider_location",
            MessageKind::Notification => "notification",
            MessageKind::ChatMessage => "chat_message",
            MessageKind::Subscribed => "subscribed",
            MessageKind::Unsubscribed => "unsubscribed",
            MessageKind::Pong => "pong",
            MessageKind::Error => "error",
        }
    }
}

/// A dispatched inbound message of a recognized type.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub kind: MessageKind,
    pub data: Value,
    pub message_id: Option<String>,
}
