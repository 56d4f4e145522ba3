//! Live rider tracking for an order.
//!
//! Prefers pushed `rider_location` messages on the real-time session and falls
//! back to polling the backend whenever the session is not open.

use std::time::Duration;

use log::{debug, warn};
use serde_json::Value;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::api::{DeliveryApi, RiderLocation};
use crate::session::{SessionEvent, SessionEvents, TransportSession};
use crate::types::{InboundMessage, MessageKind};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

enum Wake {
    Poll,
    Event(SessionEvent),
}

/// Channel carrying pushes for one order.
pub fn order_channel(order_id: &str) -> String {
    format!("order:{order_id}")
}

/// Source of [`TrackedOrder`]s.
#[derive(Debug, Clone)]
pub struct DeliveryTracker {
    session: TransportSession,
    delivery: DeliveryApi,
    poll_interval: Duration,
}

impl DeliveryTracker {
    /// `delivery` should be built on a gated client.
    pub fn new(session: TransportSession, delivery: DeliveryApi) -> Self {
        Self {
            session,
            delivery,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Interval between location polls while the session is down. Default: 10 seconds
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Start tracking `order_id`. Must be called inside a tokio runtime.
    pub fn track(&self, order_id: impl Into<String>) -> TrackedOrder {
        let order_id = order_id.into();
        let channel = order_channel(&order_id);
        let events = self.session.events();
        self.session.subscribe([channel.clone()]);

        let mut poll = interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        TrackedOrder {
            order_id,
            channel,
            session: self.session.clone(),
            delivery: self.delivery.clone(),
            events,
            poll,
        }
    }
}

/// Location updates for one order. Unsubscribes from the order channel when
/// dropped.
#[derive(Debug)]
pub struct TrackedOrder {
    order_id: String,
    channel: String,
    session: TransportSession,
    delivery: DeliveryApi,
    events: SessionEvents,
    poll: Interval,
}

impl TrackedOrder {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    /// Next location update.
    ///
    /// Waits for a push while the session is open. Otherwise polls, with the
    /// first poll immediately; failed polls are logged and retried on the
    /// next tick.
    pub async fn next(&mut self) -> RiderLocation {
        loop {
            if self.session.is_open() {
                if let Some(event) = self.events.recv().await {
                    if let Some(location) = self.on_event(event) {
                        return location;
                    }
                    continue;
                }
            }

            let wake = tokio::select! {
                _ = self.poll.tick() => Wake::Poll,
                Some(event) = self.events.recv() => Wake::Event(event),
            };

            match wake {
                Wake::Poll => match self.delivery.rider_location(&self.order_id).await {
                    Ok(location) => return location,
                    Err(e) => warn!("Polling rider location for {} failed: {}", self.order_id, e),
                },
                Wake::Event(event) => {
                    if let Some(location) = self.on_event(event) {
                        return location;
                    }
                }
            }
        }
    }

    fn on_event(&mut self, event: SessionEvent) -> Option<RiderLocation> {
        match event {
            SessionEvent::Message(message) => self.location_from(&message),
            SessionEvent::Open => {
                debug!("Session reopened; resubscribing to {}", self.channel);
                self.session.subscribe([self.channel.clone()]);
                None
            }
            SessionEvent::Closed { .. } => {
                debug!("Session down; polling for {}", self.order_id);
                None
            }
            _ => None,
        }
    }

    fn location_from(&self, message: &InboundMessage) -> Option<RiderLocation> {
        if message.kind != MessageKind::RiderLocation {
            return None;
        }
        let for_order = match message.data.get("order_id") {
            Some(Value::String(id)) => *id == self.order_id,
            Some(Value::Number(id)) => id.to_string() == self.order_id,
            _ => false,
        };
        if !for_order {
            return None;
        }

        match serde_json::from_value(message.data.clone()) {
            Ok(location) => Some(location),
            Err(e) => {
                warn!("Malformed rider_location for {}: {}", self.order_id, e);
                None
            }
        }
    }
}

impl Drop for TrackedOrder {
    fn drop(&mut self) {
        self.session.unsubscribe([self.channel.clone()]);
    }
}
