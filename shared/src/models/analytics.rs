//! Queue Analytics (排队统计)

use serde::{Deserialize, Serialize};

/// Aggregated statistics over a period of completed entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueAnalytics {
    pub restaurant_id: String,
    pub period_start: i64,
    pub period_end: i64,

    pub total_entries: u32,
    pub seated_count: u32,
    pub cancelled_count: u32,
    pub no_show_count: u32,
    pub expired_count: u32,

    /// Fractions in `0.0..=1.0` of `total_entries`
    pub seated_rate: f64,
    pub cancellation_rate: f64,
    pub no_show_rate: f64,
    pub expiration_rate: f64,

    /// Wait statistics over seated entries, in minutes
    pub avg_wait_minutes: f64,
    pub wait_p50_minutes: u32,
    pub wait_p90_minutes: u32,
    pub wait_p95_minutes: u32,

    /// Joins per venue-local hour (24 buckets)
    pub hourly_distribution: Vec<u32>,
    /// Joins per venue-local weekday, Monday first (7 buckets)
    pub daily_distribution: Vec<u32>,
    pub busiest_hour: Option<u8>,
    pub busiest_day: Option<u8>,
    pub peak_queue_size: u32,
}

/// Live counters kept by the analytics worker since process start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RollingQueueStats {
    pub completed: u64,
    pub seated: u64,
    pub cancelled: u64,
    pub no_show: u64,
    pub expired: u64,
    pub total_wait_minutes_seated: u64,
    pub last_completed_at: Option<i64>,
}
