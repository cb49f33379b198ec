//! Pub/sub broker — broadcast events from services to any number of consumers.

use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

/// Kind of change an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Created,
    Updated,
    Deleted,
}

/// An event published by a service.
#[derive(Debug, Clone)]
pub struct Event<T> {
    pub event_type: EventType,
    pub payload: T,
}

/// Broadcast-backed event broker.
///
/// Subscribers that fall behind lose the oldest buffered events; the
/// stream reports the lag and continues. Publishers never block.
pub struct Broker<T> {
    tx: broadcast::Sender<Event<T>>,
}

const BROKER_CAPACITY: usize = 256;

impl<T: Clone + Send + 'static> Broker<T> {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROKER_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    pub fn publish(&self, event_type: EventType, payload: T) {
        // No subscribers is not an error.
        let _ = self.tx.send(Event {
            event_type,
            payload,
        });
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> BroadcastStream<Event<T>> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let broker: Broker<String> = Broker::new();
        let mut stream = broker.subscribe();

        broker.publish(EventType::Created, "hello".to_string());

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.event_type, EventType::Created);
        assert_eq!(event.payload, "hello");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_see_events() {
        let broker: Broker<u32> = Broker::new();
        let mut a = broker.subscribe();
        let mut b = broker.subscribe();

        broker.publish(EventType::Updated, 7);

        assert_eq!(a.next().await.unwrap().unwrap().payload, 7);
        assert_eq!(b.next().await.unwrap().unwrap().payload, 7);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let broker: Broker<u32> = Broker::new();
        broker.publish(EventType::Deleted, 1);
        assert_eq!(broker.subscriber_count(), 0);
    }
}
