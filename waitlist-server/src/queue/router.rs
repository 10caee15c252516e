//! Queue Event Router - 提交后的事件分发
//!
//! Called by the allocator after a successful commit, while the restaurant
//! lock is still held, so subscribers see events in version order.
//!
//! ```text
//! PositionAllocator (commit)
//!        │
//!        └── QueueEventRouter
//!               ├── broadcast ──► SSE subscribers (restaurant / entry topics)
//!               ├── mpsc ──► NotificationDispatcher [best-effort, sweeper retries]
//!               └── mpsc ──► AnalyticsAggregator (history rows) [best-effort]
//! ```
//!
//! Nothing here blocks: a full channel drops the item with a warning. A
//! dropped notification is still `pending` in the store.

use std::sync::Arc;

use shared::models::{QueueHistory, QueueNotification};
use tokio::sync::mpsc;

use super::aggregate::MutationOutcome;
use super::broadcaster::QueueBroadcaster;

/// Receiving ends handed to the workers
pub struct EventChannels {
    pub notification_rx: mpsc::Receiver<QueueNotification>,
    pub analytics_rx: mpsc::Receiver<QueueHistory>,
}

pub struct QueueEventRouter {
    broadcaster: Arc<QueueBroadcaster>,
    notification_tx: mpsc::Sender<QueueNotification>,
    analytics_tx: mpsc::Sender<QueueHistory>,
}

impl QueueEventRouter {
    pub fn new(
        broadcaster: Arc<QueueBroadcaster>,
        notification_buffer: usize,
        analytics_buffer: usize,
    ) -> (Self, EventChannels) {
        let (notification_tx, notification_rx) = mpsc::channel(notification_buffer.max(1));
        let (analytics_tx, analytics_rx) = mpsc::channel(analytics_buffer.max(1));
        (
            Self {
                broadcaster,
                notification_tx,
                analytics_tx,
            },
            EventChannels {
                notification_rx,
                analytics_rx,
            },
        )
    }

    pub fn broadcaster(&self) -> &Arc<QueueBroadcaster> {
        &self.broadcaster
    }

    /// Fan out a committed outcome
    pub fn route(&self, outcome: &MutationOutcome) {
        if !outcome.events.is_empty() {
            let delivered = self.broadcaster.publish_all(&outcome.events);
            tracing::trace!(
                restaurant_id = %outcome.restaurant_id,
                version = outcome.version,
                events = outcome.events.len(),
                delivered,
                "Queue events published"
            );
        }

        for record in &outcome.notifications {
            self.enqueue_notification(record.clone());
        }

        for row in &outcome.history {
            match self.analytics_tx.try_send(row.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(row)) => {
                    tracing::warn!(
                        restaurant_id = %row.restaurant_id,
                        entry_id = %row.queue_entry_id,
                        "Analytics channel full, history row dropped from live stats"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!("Analytics channel closed");
                }
            }
        }
    }

    /// Hand a pending record to the dispatcher. Returns false if dropped.
    pub fn enqueue_notification(&self, record: QueueNotification) -> bool {
        match self.notification_tx.try_send(record) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(record)) => {
                tracing::warn!(
                    notification_id = %record.id,
                    "Notification channel full, record stays pending"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Notification channel closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::contract::entry;
    use serde_json::json;
    use shared::models::{
        DeliveryStatus, NotificationType, PartySizeClass, QueueStatus,
    };
    use shared::queue::{QueueEventType, QueueSseEvent};

    fn notification(id: &str) -> QueueNotification {
        QueueNotification {
            id: id.into(),
            queue_entry_id: "e1".into(),
            restaurant_id: "r1".into(),
            notification_type: NotificationType::Joined,
            send_sms: true,
            send_email: false,
            send_push: false,
            phone_number: Some("+1".into()),
            email: None,
            user_id: None,
            delivery_status: DeliveryStatus::Pending,
            message_content: "hi".into(),
            attempts: 0,
            failure_reason: None,
            created_at: 0,
            sent_at: None,
            delivered_at: None,
            updated_at: 0,
        }
    }

    fn outcome() -> MutationOutcome {
        let e = entry("r1", "e1", 1, QueueStatus::Seated);
        MutationOutcome {
            restaurant_id: "r1".into(),
            version: 4,
            changed_entries: vec![e],
            notifications: vec![notification("n1"), notification("n2")],
            history: vec![QueueHistory {
                id: "h1".into(),
                queue_entry_id: "e1".into(),
                restaurant_id: "r1".into(),
                identity_key: "name:x".into(),
                party_size: 2,
                party_size_class: PartySizeClass::Small,
                wait_duration_minutes: 12,
                final_status: QueueStatus::Seated,
                day_of_week: 2,
                hour_of_day: 19,
                actual_position: 1,
                initial_position: 3,
                queue_size_at_join: 3,
                joined_at: 0,
                completed_at: 720_000,
            }],
            events: vec![QueueSseEvent::new(
                QueueEventType::StatusChange,
                "r1",
                Some("e1".into()),
                json!({}),
                0,
                4,
            )],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_route_fans_out() {
        let broadcaster = Arc::new(QueueBroadcaster::new(16));
        let mut sub = broadcaster.subscribe_entry("e1");
        let (router, mut channels) = QueueEventRouter::new(broadcaster, 8, 8);

        router.route(&outcome());

        let event = sub.recv().await.unwrap();
        assert_eq!(event.sequence, 4);
        assert_eq!(channels.notification_rx.recv().await.unwrap().id, "n1");
        assert_eq!(channels.notification_rx.recv().await.unwrap().id, "n2");
        assert_eq!(channels.analytics_rx.recv().await.unwrap().id, "h1");
    }

    #[tokio::test]
    async fn test_full_channel_drops_without_blocking() {
        let broadcaster = Arc::new(QueueBroadcaster::new(16));
        let (router, mut channels) = QueueEventRouter::new(broadcaster, 1, 1);

        router.route(&outcome());

        assert_eq!(channels.notification_rx.recv().await.unwrap().id, "n1");
        assert!(channels.notification_rx.try_recv().is_err());
        assert!(router.enqueue_notification(notification("n3")));
    }
}
