// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for growth events
//
// In-memory streaming of every GrowthEvent appended by the lifecycle
// manager, using tokio broadcast channels. The audit log remains the durable
// record; the bus only serves live observers (CLI watch, tests).

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{GrowthEvent, GrowthEventType};

/// Event bus for publishing and subscribing to growth events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GrowthEvent>>,
}

impl EventBus {
    /// Capacity determines how many events can be buffered before slow
    /// receivers start lagging.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender: Arc::new(sender) }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: GrowthEvent) {
        debug!(event_type = %event.event_type, "Publishing growth event");

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn publish_all(&self, events: &[GrowthEvent]) {
        for event in events {
            self.publish(event.clone());
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe(), only: None }
    }

    /// Subscribe to a single event type
    pub fn subscribe_type(&self, event_type: GrowthEventType) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe(), only: Some(event_type) }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<GrowthEvent>,
    only: Option<GrowthEventType>,
}

impl EventReceiver {
    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<GrowthEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without blocking
    pub fn try_recv(&mut self) -> Result<GrowthEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    fn accepts(&self, event: &GrowthEvent) -> bool {
        self.only.is_none_or(|t| t == event.event_type)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(GrowthEvent::experience("openings", Map::new()));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type, GrowthEventType::ExperienceRecorded);
        assert_eq!(received.pattern_topic.as_deref(), Some("openings"));
    }

    #[tokio::test]
    async fn test_typed_subscription_skips_other_events() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe_type(GrowthEventType::ConfidenceDowngraded);

        bus.publish(GrowthEvent::experience("openings", Map::new()));
        let mut downgraded = GrowthEvent::experience("openings", Map::new());
        downgraded.event_type = GrowthEventType::ConfidenceDowngraded;
        bus.publish(downgraded);

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.event_type, GrowthEventType::ConfidenceDowngraded);
        assert!(matches!(receiver.try_recv(), Err(EventBusError::Empty)));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(GrowthEvent::experience("openings", Map::new()));
    }
}
