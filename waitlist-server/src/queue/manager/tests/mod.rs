use super::*;
use crate::queue::broadcaster::{EventReceiver, QueueBroadcaster};
use crate::queue::estimator::{EstimatorConfig, WaitTimeEstimator};
use crate::queue::router::EventChannels;
use crate::queue::store::{MemoryQueueStore, QueueMutation};
use shared::models::{GuestInfo, NotifyChannels};
use shared::queue::{QueueEventType, QueueSseEvent};
use std::time::Duration;

mod test_flows;

struct Harness {
    manager: Arc<QueueManager>,
    broadcaster: Arc<QueueBroadcaster>,
    channels: EventChannels,
}

impl Harness {
    fn store(&self) -> &Arc<dyn QueueStore> {
        self.manager.store()
    }

    async fn active_positions(&self, restaurant_id: &str) -> Vec<(String, u32)> {
        self.store()
            .list_entries(restaurant_id, &QueueStatus::ACTIVE)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.guest_name.unwrap_or_default(), e.position))
            .collect()
    }

    async fn assert_contiguous(&self, restaurant_id: &str) {
        let positions: Vec<u32> = self
            .active_positions(restaurant_id)
            .await
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        let expected: Vec<u32> = (1..=positions.len() as u32).collect();
        assert_eq!(positions, expected, "active positions must be 1..=N");
    }

    /// Insert entries directly, bypassing the allocator
    async fn seed(&self, entries: Vec<QueueEntry>) {
        let rid = entries[0].restaurant_id.clone();
        let version = self.store().queue_version(&rid).await.unwrap();
        let mut m = QueueMutation::new(rid);
        m.entries = entries;
        self.store().commit(m, version).await.unwrap();
    }
}

async fn harness_with(settings: RestaurantQueueSettings) -> Harness {
    let store: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());
    store.put_settings(&settings).await.unwrap();

    let broadcaster = Arc::new(QueueBroadcaster::new(256));
    let (router, channels) = QueueEventRouter::new(broadcaster.clone(), 1024, 1024);
    let estimator = Arc::new(WaitTimeEstimator::new(EstimatorConfig {
        alpha: 0.3,
        min_samples: 5,
        lookback_hours: 336,
        ttl: Duration::from_secs(300),
    }));
    let allocator = PositionAllocator::new(store, estimator, Arc::new(router), 3, 30);
    Harness {
        manager: Arc::new(QueueManager::new(allocator, 5)),
        broadcaster,
        channels,
    }
}

async fn harness() -> Harness {
    harness_with(RestaurantQueueSettings::with_defaults("r1")).await
}

fn guest(name: &str, party_size: u32) -> JoinQueueRequest {
    JoinQueueRequest {
        party_size,
        guest_info: Some(GuestInfo {
            guest_name: Some(name.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn sms_guest(name: &str, phone: &str) -> JoinQueueRequest {
    JoinQueueRequest {
        party_size: 2,
        guest_info: Some(GuestInfo {
            guest_name: Some(name.to_string()),
            phone_number: Some(phone.to_string()),
            email: None,
        }),
        notify: NotifyChannels {
            sms: true,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Drain events until one of `event_type` arrives
async fn next_event_of(rx: &mut EventReceiver, event_type: QueueEventType) -> QueueSseEvent {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            let event = rx.recv().await.unwrap();
            if event.event_type == event_type {
                return event;
            }
        }
    })
    .await
    .expect("event not published in time")
}
