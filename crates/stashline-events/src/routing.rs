//! In-process event bus built on `tokio::broadcast`.
//!
//! # Design
//! - Stands in for the host bus when the forwarder is embedded in the same
//!   process as the producer, and backs the integration tests.
//! - Does not buffer for late subscribers: a receiver only sees events
//!   published after it subscribed.
//! - When a receiver falls behind the channel capacity, the oldest events
//!   are dropped for that receiver and the gap is surfaced as `Lagged`.

use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::BroadcastStream;

use crate::payloads::{DEFAULT_BUS_CAPACITY, Event};

/// Stream handed to subscribers.
pub type EventStream = BroadcastStream<Event>;

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<Event>,
}

impl EventBus {
    /// Construct a bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Construct a bus with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Publish an event to all current subscribers, returning how many
    /// receivers it was handed to.
    ///
    /// Publishing with no subscribers attached is not an error; the event is
    /// simply not observed by anyone.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        BroadcastStream::new(self.sender.subscribe())
    }

    /// Number of receivers currently attached.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use tokio_stream::StreamExt;
    use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

    fn event(tag: &str) -> Event {
        Event::new(tag, Map::new())
    }

    #[tokio::test]
    async fn publish_reaches_current_subscribers_in_order() {
        let bus = EventBus::with_capacity(8);
        let mut stream = bus.subscribe();

        assert_eq!(bus.publish(event("salt/job/1/new")), 1);
        assert_eq!(bus.publish(event("salt/job/2/new")), 1);

        let first = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(first.tag(), "salt/job/1/new");
        let second = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(second.tag(), "salt/job/2/new");
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = EventBus::with_capacity(8);
        assert_eq!(bus.publish(event("before")), 0);
        let mut stream = bus.subscribe();
        let _ = bus.publish(event("after"));

        let received = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(received.tag(), "after");
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let bus = EventBus::with_capacity(2);
        let mut stream = bus.subscribe();
        for i in 0..5 {
            let _ = bus.publish(event(&format!("tick/{i}")));
        }

        let first = stream.next().await.expect("stream item");
        assert!(matches!(first, Err(BroadcastStreamRecvError::Lagged(3))));
        let next = stream
            .next()
            .await
            .expect("stream item")
            .expect("broadcast ok");
        assert_eq!(next.tag(), "tick/3");
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = EventBus::new();
        assert_eq!(bus.subscriber_count(), 0);
        let stream = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(stream);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
