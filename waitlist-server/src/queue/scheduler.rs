//! 自动叫号调度器
//!
//! Wakes every `SCHEDULER_TICK_SECS`. A restaurant is due when
//! `auto_call_enabled` and at least `auto_call_interval` minutes passed since
//! its last tick. Calls go through [`QueueManager::call_next`], the same
//! path staff use, so they queue up on the restaurant lock.
//!
//! Restaurants are called concurrently; a restaurant whose previous tick is
//! still running is skipped.

use std::sync::Arc;
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use shared::util::{MINUTE_MILLIS, now_millis};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manager::QueueManager;

/// Clears the in-flight flag when the tick finishes, panics included
struct InFlightGuard {
    set: Arc<DashSet<String>>,
    restaurant_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.restaurant_id);
    }
}

pub struct AutoCallScheduler {
    manager: Arc<QueueManager>,
    shutdown: CancellationToken,
    tick: Duration,
    batch: u32,
    last_tick: DashMap<String, i64>,
    in_flight: Arc<DashSet<String>>,
}

impl AutoCallScheduler {
    pub fn new(
        manager: Arc<QueueManager>,
        shutdown: CancellationToken,
        tick: Duration,
        batch: u32,
    ) -> Self {
        Self {
            manager,
            shutdown,
            tick,
            batch: batch.max(1),
            last_tick: DashMap::new(),
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// 主循环
    pub async fn run(self) {
        tracing::info!(tick_secs = self.tick.as_secs(), "Auto-call scheduler started");
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(now_millis()).await;
                }
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Auto-call scheduler received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("Auto-call scheduler stopped");
    }

    /// One scheduler pass. Returns the spawned per-restaurant calls.
    pub async fn tick(&self, now: i64) -> Vec<JoinHandle<()>> {
        let restaurants = match self.manager.store().list_restaurants().await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Auto-call scheduler failed to list restaurants");
                return Vec::new();
            }
        };

        let mut handles = Vec::new();
        for settings in restaurants {
            if !settings.auto_call_enabled {
                continue;
            }
            let rid = settings.restaurant_id.clone();
            let interval_ms = i64::from(settings.auto_call_interval) * MINUTE_MILLIS;
            let due = self
                .last_tick
                .get(&rid)
                .is_none_or(|last| now - *last >= interval_ms);
            if !due {
                continue;
            }
            if !settings.accepts_joins_at(now) {
                // Closed venue: the tick is a no-op
                tracing::trace!(restaurant_id = %rid, "Auto-call skipped, venue closed");
                continue;
            }
            if !self.in_flight.insert(rid.clone()) {
                tracing::debug!(restaurant_id = %rid, "Auto-call still in flight, skipping tick");
                continue;
            }
            self.last_tick.insert(rid.clone(), now);

            let guard = InFlightGuard {
                set: self.in_flight.clone(),
                restaurant_id: rid.clone(),
            };
            let manager = self.manager.clone();
            let batch = self.batch;
            handles.push(tokio::spawn(async move {
                let _guard = guard;
                match manager.call_next(&rid, Some(batch)).await {
                    Ok(resp) if !resp.called_entries.is_empty() => {
                        tracing::info!(
                            restaurant_id = %rid,
                            called = resp.called_entries.len(),
                            remaining = resp.remaining_queue_size,
                            "Auto-call tick"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(restaurant_id = %rid, error = %e, "Auto-call tick failed");
                    }
                }
            }));
        }
        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::testing::manager_with;
    use shared::models::{QueueStatus, RestaurantQueueSettings};
    use shared::queue::JoinQueueRequest;
    use shared::models::GuestInfo;

    fn join(name: &str) -> JoinQueueRequest {
        JoinQueueRequest {
            party_size: 2,
            guest_info: Some(GuestInfo {
                guest_name: Some(name.into()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn setup(auto_call: bool) -> (Arc<QueueManager>, AutoCallScheduler) {
        let mut settings = RestaurantQueueSettings::with_defaults("r1");
        settings.auto_call_enabled = auto_call;
        settings.auto_call_interval = 5;
        let manager = manager_with(settings).await;
        for name in ["a", "b", "c"] {
            manager.join_queue("r1", join(name)).await.unwrap();
        }
        let scheduler = AutoCallScheduler::new(
            manager.clone(),
            CancellationToken::new(),
            Duration::from_secs(15),
            1,
        );
        (manager, scheduler)
    }

    async fn called(manager: &QueueManager) -> usize {
        manager
            .store()
            .list_entries("r1", &[QueueStatus::Called])
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn test_tick_respects_interval() {
        let (manager, scheduler) = setup(true).await;
        let t0 = now_millis();

        for h in scheduler.tick(t0).await {
            h.await.unwrap();
        }
        assert_eq!(called(&manager).await, 1);

        // Not yet due
        assert!(scheduler.tick(t0 + 4 * MINUTE_MILLIS).await.is_empty());
        assert_eq!(called(&manager).await, 1);

        for h in scheduler.tick(t0 + 5 * MINUTE_MILLIS).await {
            h.await.unwrap();
        }
        assert_eq!(called(&manager).await, 2);
    }

    #[tokio::test]
    async fn test_disabled_restaurant_is_ignored() {
        let (manager, scheduler) = setup(false).await;
        assert!(scheduler.tick(now_millis()).await.is_empty());
        assert_eq!(called(&manager).await, 0);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let (_manager, scheduler) = setup(true).await;
        scheduler.in_flight.insert("r1".to_string());
        assert!(scheduler.tick(now_millis()).await.is_empty());

        scheduler.in_flight.remove("r1");
        let handles = scheduler.tick(now_millis()).await;
        assert_eq!(handles.len(), 1);
        for h in handles {
            h.await.unwrap();
        }
        assert!(scheduler.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_manager, scheduler) = setup(true).await;
        let token = scheduler.shutdown.clone();
        let handle = tokio::spawn(scheduler.run());
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
