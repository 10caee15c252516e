//! Queue Sweeper - 定时清扫
//!
//! Every `SWEEP_INTERVAL_SECS`, per restaurant:
//!
//! 1. expire WAITING entries past `expiration_time`
//! 2. queue REMINDER notices for parties CALLED too long ago
//! 3. recompute all estimates once `ESTIMATE_REFRESH_SECS` elapsed
//!
//! then re-enqueue notification records still `pending` after a full
//! interval, and drop idle broadcast topics and restaurant locks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use shared::util::now_millis;
use tokio_util::sync::CancellationToken;

use super::manager::QueueManager;

/// Pending records re-enqueued per pass
const REDELIVERY_BATCH: usize = 200;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub reminded: usize,
    pub refreshed: usize,
    pub requeued: usize,
}

pub struct QueueSweeper {
    manager: Arc<QueueManager>,
    shutdown: CancellationToken,
    interval: Duration,
    estimate_refresh: Duration,
    last_refresh: Option<Instant>,
}

impl QueueSweeper {
    pub fn new(
        manager: Arc<QueueManager>,
        shutdown: CancellationToken,
        interval: Duration,
        estimate_refresh: Duration,
    ) -> Self {
        Self {
            manager,
            shutdown,
            interval,
            estimate_refresh,
            last_refresh: None,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Queue sweeper started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Queue sweeper received shutdown signal");
                    break;
                }
            }

            let refresh = self
                .last_refresh
                .is_none_or(|at| at.elapsed() >= self.estimate_refresh);
            let report = self.sweep(refresh).await;
            if refresh {
                self.last_refresh = Some(Instant::now());
            }
            if report != SweepReport::default() {
                tracing::info!(
                    expired = report.expired,
                    reminded = report.reminded,
                    refreshed = report.refreshed,
                    requeued = report.requeued,
                    "Queue sweep finished"
                );
            }
        }

        tracing::info!("Queue sweeper stopped");
    }

    /// One pass over every restaurant
    pub async fn sweep(&self, refresh_estimates: bool) -> SweepReport {
        let mut report = SweepReport::default();
        let restaurants = match self.manager.store().list_restaurants().await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Queue sweeper failed to list restaurants");
                return report;
            }
        };

        for settings in restaurants {
            let rid = settings.restaurant_id.as_str();
            match self.manager.expire_due(rid).await {
                Ok(ids) => report.expired += ids.len(),
                Err(e) => tracing::warn!(restaurant_id = %rid, error = %e, "Expiration sweep failed"),
            }
            match self.manager.remind_due(rid).await {
                Ok(ids) => report.reminded += ids.len(),
                Err(e) => tracing::warn!(restaurant_id = %rid, error = %e, "Reminder sweep failed"),
            }
            if refresh_estimates {
                match self.manager.refresh_estimates(rid).await {
                    Ok(outcome) => report.refreshed += outcome.changed_entries.len(),
                    Err(e) => {
                        tracing::warn!(restaurant_id = %rid, error = %e, "Estimate refresh failed")
                    }
                }
            }
        }

        report.requeued = self.requeue_pending().await;

        let router = self.manager.router();
        let pruned_topics = router.broadcaster().prune();
        let pruned_locks = self.manager.allocator().prune_locks();
        if pruned_topics + pruned_locks > 0 {
            tracing::debug!(pruned_topics, pruned_locks, "Pruned idle queue resources");
        }
        report
    }

    /// Hand abandoned `pending` records back to the dispatcher
    async fn requeue_pending(&self) -> usize {
        let cutoff = now_millis() - self.interval.as_millis() as i64;
        let pending = match self
            .manager
            .store()
            .list_pending_notifications(cutoff, REDELIVERY_BATCH)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list pending notifications");
                return 0;
            }
        };
        pending
            .into_iter()
            .filter(|record| self.manager.router().enqueue_notification(record.clone()))
            .count()
    }
}
