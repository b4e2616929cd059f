use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{Event, RoomId};

const CHANNEL_CAPACITY: usize = 256;

/// Per-room change feed of committed reservation events.
pub struct NotifyHub {
    channels: DashMap<RoomId, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    /// An empty hub. Channels are created on first subscription.
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to committed events for a room. Creates the channel if needed.
    /// A receiver that falls more than the channel capacity behind sees `Lagged`.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<Event> {
        self.channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Fan out to every room the event touches. No-op for rooms nobody follows.
    pub fn publish(&self, event: &Event) {
        for room_id in event.rooms() {
            if let Some(sender) = self.channels.get(&room_id) {
                let _ = sender.send(event.clone());
            }
        }
    }
}
