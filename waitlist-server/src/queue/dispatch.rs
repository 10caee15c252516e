//! Notification Dispatcher - 通知派发
//!
//! Consumes pending records handed over after commit and delivers them
//! through a [`NotificationTransport`]. Delivery failures never touch the
//! queue: a record that keeps failing ends up `failed` and the committed
//! transition stands.
//!
//! Records dropped by a full channel stay `pending` in the store and are
//! picked up again by the sweeper (see [`super::router`]).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashSet;
use shared::models::{DeliveryChannel, DeliveryStatus, QueueNotification};
use shared::util::now_millis;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

use super::store::QueueStore;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 10_000;
const DISPATCH_CONCURRENCY: usize = 16;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Temporary failure, worth retrying
    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the message; retrying will not help
    #[error("Rejected by provider: {0}")]
    Rejected(String),
}

/// Sends one message over one channel (SMS gateway, mailer, push service)
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(
        &self,
        channel: DeliveryChannel,
        record: &QueueNotification,
    ) -> Result<(), DeliveryError>;
}

/// Default transport: writes the message to the `notification` log target
pub struct LogTransport;

#[async_trait]
impl NotificationTransport for LogTransport {
    async fn send(
        &self,
        channel: DeliveryChannel,
        record: &QueueNotification,
    ) -> Result<(), DeliveryError> {
        tracing::info!(
            target: "notification",
            notification_id = %record.id,
            entry_id = %record.queue_entry_id,
            channel = ?channel,
            notification_type = %record.notification_type,
            phone = ?record.phone_number,
            email = ?record.email,
            "{}",
            record.message_content
        );
        Ok(())
    }
}

/// Exponential backoff: base * 2^(attempt-1), capped
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
        .min(Duration::from_millis(RETRY_MAX_DELAY_MS))
}

pub struct NotificationDispatcher {
    store: Arc<dyn QueueStore>,
    transport: Arc<dyn NotificationTransport>,
    semaphore: Arc<Semaphore>,
    in_flight: DashSet<String>,
    retry_base: Duration,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn QueueStore>, transport: Arc<dyn NotificationTransport>) -> Self {
        Self {
            store,
            transport,
            semaphore: Arc::new(Semaphore::new(DISPATCH_CONCURRENCY)),
            in_flight: DashSet::new(),
            retry_base: Duration::from_millis(RETRY_BASE_DELAY_MS),
        }
    }

    /// Shorter backoff for tests
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.retry_base = base;
        self
    }

    /// 主循环：接收记录并发派发，直到通道关闭或 shutdown
    pub async fn run(self, mut rx: mpsc::Receiver<QueueNotification>, shutdown: CancellationToken) {
        tracing::info!(concurrency = DISPATCH_CONCURRENCY, "Notification dispatcher started");
        let dispatcher = Arc::new(self);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Notification dispatcher received shutdown signal");
                    break;
                }
                next = rx.recv() => {
                    let Some(record) = next else {
                        tracing::info!("Notification channel closed, stopping dispatcher");
                        break;
                    };
                    let Ok(permit) = dispatcher.semaphore.clone().acquire_owned().await else {
                        break;
                    };
                    let d = dispatcher.clone();
                    tokio::spawn(async move {
                        d.deliver(record).await;
                        drop(permit);
                    });
                }
            }
        }
    }

    /// Deliver one record with retries and persist the final status
    pub async fn deliver(&self, record: QueueNotification) -> Option<QueueNotification> {
        if !self.in_flight.insert(record.id.clone()) {
            tracing::debug!(notification_id = %record.id, "Delivery already in flight");
            return None;
        }
        let id = record.id.clone();
        let result = self.deliver_inner(record).await;
        self.in_flight.remove(&id);
        result
    }

    async fn deliver_inner(&self, record: QueueNotification) -> Option<QueueNotification> {
        let id = record.id.clone();
        // The sweeper may re-enqueue a record that was already handled
        let mut record = match self.store.get_notification(&id).await {
            Ok(Some(stored)) if stored.delivery_status == DeliveryStatus::Pending => stored,
            Ok(Some(_)) => return None,
            Ok(None) => record,
            Err(e) => {
                tracing::error!(notification_id = %id, error = %e, "Failed to load notification");
                return None;
            }
        };

        let mut remaining = record.channels();
        let mut last_error: Option<DeliveryError> = None;
        let mut attempts = record.attempts;

        while !remaining.is_empty() && attempts < MAX_ATTEMPTS {
            attempts += 1;
            let mut failed = Vec::new();
            for channel in remaining {
                match self.transport.send(channel, &record).await {
                    Ok(()) => {}
                    Err(e) => {
                        tracing::warn!(
                            notification_id = %id,
                            channel = ?channel,
                            attempt = attempts,
                            error = %e,
                            "Notification delivery failed"
                        );
                        let permanent = matches!(e, DeliveryError::Rejected(_));
                        last_error = Some(e);
                        if permanent {
                            attempts = MAX_ATTEMPTS;
                        }
                        failed.push(channel);
                    }
                }
            }
            remaining = failed;
            if !remaining.is_empty() && attempts < MAX_ATTEMPTS {
                tokio::time::sleep(retry_delay(self.retry_base, attempts)).await;
            }
        }

        let now = now_millis();
        record.attempts = attempts;
        record.updated_at = now;
        if remaining.is_empty() {
            record.delivery_status = DeliveryStatus::Sent;
            record.sent_at = Some(now);
            record.failure_reason = None;
        } else {
            record.delivery_status = DeliveryStatus::Failed;
            record.failure_reason = last_error.map(|e| e.to_string());
            tracing::error!(
                notification_id = %id,
                attempts,
                reason = ?record.failure_reason,
                "Notification delivery gave up"
            );
        }

        // A provider callback may have finalized the record while we were sending
        match self.store.get_notification(&id).await {
            Ok(Some(stored)) if stored.delivery_status.is_final() => {
                tracing::debug!(
                    notification_id = %id,
                    status = ?stored.delivery_status,
                    "Notification already final, keeping callback status"
                );
                return Some(stored);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(notification_id = %id, error = %e, "Failed to reload notification");
            }
        }

        if let Err(e) = self.store.update_notification(&record).await {
            tracing::error!(notification_id = %id, error = %e, "Failed to persist delivery status");
        }
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::store::{MemoryQueueStore, QueueMutation};
    use shared::models::NotificationType;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyTransport {
        calls: AtomicU32,
        fail_first: u32,
        reject: bool,
    }

    #[async_trait]
    impl NotificationTransport for FlakyTransport {
        async fn send(
            &self,
            _channel: DeliveryChannel,
            _record: &QueueNotification,
        ) -> Result<(), DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(DeliveryError::Rejected("invalid number".into()));
            }
            if n < self.fail_first {
                Err(DeliveryError::Unavailable("gateway timeout".into()))
            } else {
                Ok(())
            }
        }
    }

    fn record(id: &str) -> QueueNotification {
        QueueNotification {
            id: id.into(),
            queue_entry_id: "e1".into(),
            restaurant_id: "r1".into(),
            notification_type: NotificationType::Ready,
            send_sms: true,
            send_email: false,
            send_push: false,
            phone_number: Some("+1555".into()),
            email: None,
            user_id: None,
            delivery_status: DeliveryStatus::Pending,
            message_content: "ready".into(),
            attempts: 0,
            failure_reason: None,
            created_at: 0,
            sent_at: None,
            delivered_at: None,
            updated_at: 0,
        }
    }

    async fn setup(transport: FlakyTransport) -> (Arc<MemoryQueueStore>, NotificationDispatcher) {
        let store = Arc::new(MemoryQueueStore::new());
        let mut m = QueueMutation::new("r1");
        m.notifications.push(record("n1"));
        store.commit(m, 0).await.unwrap();
        let dispatcher = NotificationDispatcher::new(store.clone(), Arc::new(transport))
            .with_retry_base(Duration::from_millis(1));
        (store, dispatcher)
    }

    #[test]
    fn test_retry_delay_backoff() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(retry_delay(base, 10), Duration::from_millis(RETRY_MAX_DELAY_MS));
    }

    #[tokio::test]
    async fn test_log_transport_sends() {
        let (store, _) = setup(FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 0,
            reject: false,
        })
        .await;
        let dispatcher = NotificationDispatcher::new(store.clone(), Arc::new(LogTransport));
        let out = dispatcher.deliver(record("n1")).await.unwrap();
        assert_eq!(out.delivery_status, DeliveryStatus::Sent);
        assert_eq!(out.attempts, 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let (store, dispatcher) = setup(FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 2,
            reject: false,
        })
        .await;
        let out = dispatcher.deliver(record("n1")).await.unwrap();
        assert_eq!(out.delivery_status, DeliveryStatus::Sent);
        assert_eq!(out.attempts, 3);
        let stored = store.get_notification("n1").await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Sent);
        assert!(stored.sent_at.is_some());
    }

    #[tokio::test]
    async fn test_exhausted_retries_mark_failed() {
        let (store, dispatcher) = setup(FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 10,
            reject: false,
        })
        .await;
        let out = dispatcher.deliver(record("n1")).await.unwrap();
        assert_eq!(out.delivery_status, DeliveryStatus::Failed);
        assert_eq!(out.attempts, MAX_ATTEMPTS);
        let stored = store.get_notification("n1").await.unwrap().unwrap();
        assert!(stored.failure_reason.unwrap().contains("gateway timeout"));
    }

    #[tokio::test]
    async fn test_rejection_is_not_retried() {
        let transport = FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 0,
            reject: true,
        };
        let (_store, dispatcher) = setup(transport).await;
        let out = dispatcher.deliver(record("n1")).await.unwrap();
        assert_eq!(out.delivery_status, DeliveryStatus::Failed);
    }

    #[tokio::test]
    async fn test_already_sent_record_is_skipped() {
        let (store, dispatcher) = setup(FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 0,
            reject: false,
        })
        .await;
        dispatcher.deliver(record("n1")).await.unwrap();
        // Re-enqueued duplicate
        assert!(dispatcher.deliver(record("n1")).await.is_none());
        let stored = store.get_notification("n1").await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
    }

    /// Provider whose delivery callback lands before `send` returns
    struct FastCallbackTransport {
        store: Arc<MemoryQueueStore>,
    }

    #[async_trait]
    impl NotificationTransport for FastCallbackTransport {
        async fn send(
            &self,
            _channel: DeliveryChannel,
            record: &QueueNotification,
        ) -> Result<(), DeliveryError> {
            let mut stored = self.store.get_notification(&record.id).await.unwrap().unwrap();
            stored.delivery_status = DeliveryStatus::Delivered;
            stored.delivered_at = Some(42);
            self.store.update_notification(&stored).await.unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_callback_status_survives_dispatch() {
        let (store, _) = setup(FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 0,
            reject: false,
        })
        .await;
        let transport = FastCallbackTransport {
            store: store.clone(),
        };
        let dispatcher = NotificationDispatcher::new(store.clone(), Arc::new(transport));

        let out = dispatcher.deliver(record("n1")).await.unwrap();
        assert_eq!(out.delivery_status, DeliveryStatus::Delivered);
        let stored = store.get_notification("n1").await.unwrap().unwrap();
        assert_eq!(stored.delivery_status, DeliveryStatus::Delivered);
        assert_eq!(stored.delivered_at, Some(42));
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let (store, dispatcher) = setup(FlakyTransport {
            calls: AtomicU32::new(0),
            fail_first: 0,
            reject: false,
        })
        .await;
        let (tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(rx, token.clone()));

        tx.send(record("n1")).await.unwrap();
        for _ in 0..50 {
            let stored = store.get_notification("n1").await.unwrap().unwrap();
            if stored.delivery_status == DeliveryStatus::Sent {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            store.get_notification("n1").await.unwrap().unwrap().delivery_status,
            DeliveryStatus::Sent
        );
        token.cancel();
        handle.await.unwrap();
    }
}
