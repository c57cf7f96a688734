mod events;

pub use events::{ClientEvent, RelayEvent};

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use uuid::Uuid;

/// A relay room. Every event fans out to the subscribers of one room:
/// the global feed, one stream's audience, or one user's private channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Room(String);

impl Room {
    pub fn feed() -> Self {
        Room("feed".to_string())
    }

    pub fn stream(stream_id: &str) -> Self {
        Room(format!("stream:{stream_id}"))
    }

    pub fn user(user_id: &str) -> Self {
        Room(format!("user:{user_id}"))
    }
}

impl std::fmt::Display for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a relay subscriber, used for precise cleanup
/// when a socket closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// In-process fanout registry: room -> live subscribers. Broadcast drops
/// subscribers whose channel is gone, so a crashed socket cannot leak.
#[derive(Default, Clone)]
pub struct RelayRegistry {
    inner: Arc<RwLock<HashMap<Room, Vec<Subscriber>>>>,
}

impl RelayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Joins a room, returning the subscriber id (for cleanup) and the
    /// receiving end of the subscriber's channel.
    pub async fn subscribe(&self, room: &Room) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let id = SubscriberId::new();

        let mut guard = self.inner.write().await;
        guard
            .entry(room.clone())
            .or_default()
            .push(Subscriber { id, sender: tx });

        (id, rx)
    }

    /// Must be called when a socket closes; empty rooms are dropped.
    pub async fn unsubscribe(&self, room: &Room, id: SubscriberId) {
        let mut guard = self.inner.write().await;

        if let Some(subscribers) = guard.get_mut(room) {
            subscribers.retain(|s| s.id != id);
            if subscribers.is_empty() {
                guard.remove(room);
            }
        }
    }

    /// Sends an event to every subscriber of a room, pruning dead senders.
    pub async fn broadcast(&self, room: &Room, event: &RelayEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(p) => p,
            Err(e) => {
                tracing::error!("failed to serialize relay event: {e}");
                return;
            }
        };

        let mut guard = self.inner.write().await;
        if let Some(subscribers) = guard.get_mut(room) {
            subscribers.retain(|s| s.sender.send(payload.clone()).is_ok());
            if subscribers.is_empty() {
                guard.remove(room);
            }
        }
    }

    pub async fn subscriber_count(&self, room: &Room) -> usize {
        let guard = self.inner.read().await;
        guard.get(room).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_broadcast_unsubscribe() {
        let registry = RelayRegistry::new();
        let room = Room::stream("s1");

        let (id1, mut rx1) = registry.subscribe(&room).await;
        let (_id2, mut rx2) = registry.subscribe(&room).await;
        assert_eq!(registry.subscriber_count(&room).await, 2);

        registry
            .broadcast(&room, &RelayEvent::StreamEnded {
                stream_id: "s1".to_string(),
            })
            .await;

        let got1 = rx1.recv().await.unwrap();
        let got2 = rx2.recv().await.unwrap();
        assert!(got1.contains("stream_ended"));
        assert_eq!(got1, got2);

        registry.unsubscribe(&room, id1).await;
        assert_eq!(registry.subscriber_count(&room).await, 1);
    }

    #[tokio::test]
    async fn test_broadcast_prunes_dead_subscribers() {
        let registry = RelayRegistry::new();
        let room = Room::feed();

        let (_id, rx) = registry.subscribe(&room).await;
        drop(rx);

        registry
            .broadcast(&room, &RelayEvent::StreamEnded {
                stream_id: "s1".to_string(),
            })
            .await;

        assert_eq!(registry.subscriber_count(&room).await, 0);
    }

    #[tokio::test]
    async fn test_rooms_are_isolated() {
        let registry = RelayRegistry::new();
        let (_id, mut rx) = registry.subscribe(&Room::stream("s1")).await;

        registry
            .broadcast(&Room::stream("s2"), &RelayEvent::StreamEnded {
                stream_id: "s2".to_string(),
            })
            .await;

        assert!(rx.try_recv().is_err());
    }
}
