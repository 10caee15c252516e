//! Realtime broadcaster
//!
//! ```text
//! commit ──▶ publish(event)
//!              ├── restaurant topic  (staff dashboards)
//!              └── entry topic       (customer page, when queue_entry_id is set)
//! ```
//!
//! Topics are `tokio::sync::broadcast` channels created on first
//! subscribe. Publishing never blocks: a slow subscriber lags and is told
//! to resync instead of holding back the write path. Events of one entry
//! go through one channel and keep their order.

use dashmap::DashMap;
use shared::queue::QueueSseEvent;
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<QueueSseEvent>;

pub struct QueueBroadcaster {
    restaurants: DashMap<String, broadcast::Sender<QueueSseEvent>>,
    entries: DashMap<String, broadcast::Sender<QueueSseEvent>>,
    capacity: usize,
}

impl QueueBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            restaurants: DashMap::new(),
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    fn subscribe_topic(
        topics: &DashMap<String, broadcast::Sender<QueueSseEvent>>,
        key: &str,
        capacity: usize,
    ) -> EventReceiver {
        topics
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(capacity).0)
            .subscribe()
    }

    pub fn subscribe_restaurant(&self, restaurant_id: &str) -> EventReceiver {
        Self::subscribe_topic(&self.restaurants, restaurant_id, self.capacity)
    }

    pub fn subscribe_entry(&self, entry_id: &str) -> EventReceiver {
        Self::subscribe_topic(&self.entries, entry_id, self.capacity)
    }

    /// Fan out one event. Returns how many receivers got it.
    pub fn publish(&self, event: &QueueSseEvent) -> usize {
        let mut delivered = 0;
        if let Some(tx) = self.restaurants.get(&event.restaurant_id) {
            delivered += tx.send(event.clone()).unwrap_or(0);
        }
        if let Some(entry_id) = event.queue_entry_id.as_deref()
            && let Some(tx) = self.entries.get(entry_id)
        {
            delivered += tx.send(event.clone()).unwrap_or(0);
        }
        delivered
    }

    pub fn publish_all(&self, events: &[QueueSseEvent]) -> usize {
        events.iter().map(|e| self.publish(e)).sum()
    }

    /// Drop topics nobody listens to. Returns the number removed.
    pub fn prune(&self) -> usize {
        let before = self.restaurants.len() + self.entries.len();
        self.restaurants.retain(|_, tx| tx.receiver_count() > 0);
        self.entries.retain(|_, tx| tx.receiver_count() > 0);
        before - (self.restaurants.len() + self.entries.len())
    }

    /// `(restaurant topics, entry topics)`
    pub fn topic_counts(&self) -> (usize, usize) {
        (self.restaurants.len(), self.entries.len())
    }
}
