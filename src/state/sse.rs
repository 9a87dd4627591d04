use tokio::sync::broadcast;

use crate::dto::sse::ServerEvent;

/// Event addressed to the clients of a single room.
#[derive(Clone, Debug)]
pub struct RoomScopedEvent {
    pub room: String,
    pub event: ServerEvent,
}

/// Broadcast hub for events that do not come from the store, such as banners.
pub struct SseHub {
    sender: broadcast::Sender<RoomScopedEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events of every room.
    pub fn subscribe(&self) -> broadcast::Receiver<RoomScopedEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, room: &str, event: ServerEvent) {
        let _ = self.sender.send(RoomScopedEvent {
            room: room.to_string(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_events_with_their_room() {
        let hub = SseHub::new(4);
        let mut receiver = hub.subscribe();
        hub.broadcast("lobby", ServerEvent::new(Some("banner".to_string()), "{}".into()));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.room, "lobby");
        assert_eq!(received.event.event.as_deref(), Some("banner"));
    }

    #[test]
    fn broadcasting_without_subscribers_is_silent() {
        let hub = SseHub::new(4);
        hub.broadcast("lobby", ServerEvent::new(None, "ping".into()));
    }
}
