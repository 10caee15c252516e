//! Queue Analytics - 排队统计
//!
//! - [`compute_analytics`] folds stored history rows into a report
//! - [`AnalyticsAggregator`] consumes rows as they are committed, keeps
//!   live counters and tells the estimator that new samples exist

use std::sync::Arc;

use dashmap::DashMap;
use shared::models::{QueueAnalytics, QueueHistory, QueueStatus, RollingQueueStats};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::estimator::WaitTimeEstimator;

/// Nearest-rank percentile over an ascending slice
fn percentile(sorted: &[u32], p: u32) -> u32 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (u64::from(p) * sorted.len() as u64).div_ceil(100).max(1) as usize;
    sorted[rank.min(sorted.len()) - 1]
}

fn rate(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(part) / f64::from(total)
    }
}

/// Index of the largest bucket, lowest index on ties. `None` when all zero.
fn busiest(buckets: &[u32]) -> Option<u8> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, &count) in buckets.iter().enumerate() {
        if count > 0 && best.is_none_or(|(_, c)| count > c) {
            best = Some((idx, count));
        }
    }
    best.map(|(idx, _)| idx as u8)
}

/// Build a report from rows completed within `[period_start, period_end]`
pub fn compute_analytics(
    restaurant_id: &str,
    history: &[QueueHistory],
    period_start: i64,
    period_end: i64,
) -> QueueAnalytics {
    let rows: Vec<&QueueHistory> = history
        .iter()
        .filter(|h| {
            h.restaurant_id == restaurant_id
                && h.completed_at >= period_start
                && h.completed_at <= period_end
        })
        .collect();

    let mut seated = 0;
    let mut cancelled = 0;
    let mut no_show = 0;
    let mut expired = 0;
    let mut hourly = vec![0u32; 24];
    let mut daily = vec![0u32; 7];
    let mut waits = Vec::new();
    let mut peak = 0;

    for row in &rows {
        match row.final_status {
            QueueStatus::Seated => {
                seated += 1;
                waits.push(row.wait_duration_minutes);
            }
            QueueStatus::Cancelled => cancelled += 1,
            QueueStatus::NoShow => no_show += 1,
            QueueStatus::Expired => expired += 1,
            QueueStatus::Waiting | QueueStatus::Called => {}
        }
        if let Some(bucket) = hourly.get_mut(usize::from(row.hour_of_day)) {
            *bucket += 1;
        }
        if let Some(bucket) = daily.get_mut(usize::from(row.day_of_week)) {
            *bucket += 1;
        }
        peak = peak.max(row.queue_size_at_join);
    }

    waits.sort_unstable();
    let total = rows.len() as u32;
    let avg_wait_minutes = if waits.is_empty() {
        0.0
    } else {
        waits.iter().map(|&w| f64::from(w)).sum::<f64>() / waits.len() as f64
    };

    QueueAnalytics {
        restaurant_id: restaurant_id.to_string(),
        period_start,
        period_end,
        total_entries: total,
        seated_count: seated,
        cancelled_count: cancelled,
        no_show_count: no_show,
        expired_count: expired,
        seated_rate: rate(seated, total),
        cancellation_rate: rate(cancelled, total),
        no_show_rate: rate(no_show, total),
        expiration_rate: rate(expired, total),
        avg_wait_minutes,
        wait_p50_minutes: percentile(&waits, 50),
        wait_p90_minutes: percentile(&waits, 90),
        wait_p95_minutes: percentile(&waits, 95),
        busiest_hour: busiest(&hourly),
        busiest_day: busiest(&daily),
        hourly_distribution: hourly,
        daily_distribution: daily,
        peak_queue_size: peak,
    }
}

/// Live counters shared with readers
pub type RollingStats = Arc<DashMap<String, RollingQueueStats>>;

fn record(stats: &mut RollingQueueStats, row: &QueueHistory) {
    stats.completed += 1;
    match row.final_status {
        QueueStatus::Seated => {
            stats.seated += 1;
            stats.total_wait_minutes_seated += u64::from(row.wait_duration_minutes);
        }
        QueueStatus::Cancelled => stats.cancelled += 1,
        QueueStatus::NoShow => stats.no_show += 1,
        QueueStatus::Expired => stats.expired += 1,
        QueueStatus::Waiting | QueueStatus::Called => {}
    }
    stats.last_completed_at = Some(
        stats
            .last_completed_at
            .map_or(row.completed_at, |at| at.max(row.completed_at)),
    );
}

pub struct AnalyticsAggregator {
    estimator: Arc<WaitTimeEstimator>,
    stats: RollingStats,
}

impl AnalyticsAggregator {
    /// `stats` is shared with readers (health, dashboards)
    pub fn new(estimator: Arc<WaitTimeEstimator>, stats: RollingStats) -> Self {
        Self { estimator, stats }
    }

    /// Handle for readers (health, dashboards)
    pub fn stats(&self) -> RollingStats {
        self.stats.clone()
    }

    pub fn ingest(&self, row: &QueueHistory) {
        record(
            &mut self.stats.entry(row.restaurant_id.clone()).or_default(),
            row,
        );
        if row.final_status == QueueStatus::Seated {
            // New wait sample: next estimate rebuilds the model
            self.estimator.invalidate(&row.restaurant_id);
        }
    }

    pub async fn run(self, mut rx: mpsc::Receiver<QueueHistory>, shutdown: CancellationToken) {
        tracing::info!("Analytics aggregator started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Analytics aggregator received shutdown signal");
                    break;
                }
                next = rx.recv() => match next {
                    Some(row) => self.ingest(&row),
                    None => {
                        tracing::info!("Analytics channel closed, stopping aggregator");
                        break;
                    }
                }
            }
        }
    }
}
