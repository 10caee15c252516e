//! Wait-time estimator
//!
//! Cold start uses the baseline `(position - 1) * avg_wait_per_party`.
//! Once a venue has seated history, waits are learned per
//! `(party size class, hour of day, position band)` with an EWMA. A bucket
//! is only trusted when the resulting curve never decreases with position;
//! otherwise the baseline is used for the whole bucket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use shared::models::{PartySizeClass, QueueHistory, QueueStatus, RestaurantQueueSettings};
use shared::util::MINUTE_MILLIS;

use super::store::QueueStore;

/// Inclusive position ranges sharing one learned value
const POSITION_BANDS: [(u32, u32); 6] = [
    (1, 1),
    (2, 3),
    (4, 5),
    (6, 10),
    (11, 20),
    (21, u32::MAX),
];

fn band_of(position: u32) -> usize {
    POSITION_BANDS
        .iter()
        .position(|&(lo, hi)| position >= lo && position <= hi)
        .unwrap_or(POSITION_BANDS.len() - 1)
}

/// Cold-start estimate in minutes
pub fn baseline_minutes(position: u32, avg_wait_per_party: u32) -> u32 {
    position.saturating_sub(1).saturating_mul(avg_wait_per_party)
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BandStat {
    ewma: f64,
    samples: usize,
}

type BucketKey = (PartySizeClass, u8);

/// Learned wait model of one restaurant
#[derive(Debug, Clone, Default)]
pub struct HistoryModel {
    buckets: HashMap<BucketKey, [BandStat; POSITION_BANDS.len()]>,
    min_samples: usize,
}

impl HistoryModel {
    /// Build from history rows. Only SEATED rows count; samples are folded
    /// in completion order.
    pub fn build(history: &[QueueHistory], alpha: f64, min_samples: usize) -> Self {
        let mut seated: Vec<&QueueHistory> = history
            .iter()
            .filter(|h| h.final_status == QueueStatus::Seated)
            .collect();
        seated.sort_by_key(|h| h.completed_at);

        let mut buckets: HashMap<BucketKey, [BandStat; POSITION_BANDS.len()]> = HashMap::new();
        for row in seated {
            let bands = buckets
                .entry((row.party_size_class, row.hour_of_day))
                .or_default();
            let stat = &mut bands[band_of(row.initial_position.max(1))];
            let x = row.wait_duration_minutes as f64;
            stat.ewma = if stat.samples == 0 {
                x
            } else {
                alpha * x + (1.0 - alpha) * stat.ewma
            };
            stat.samples += 1;
        }

        Self {
            buckets,
            min_samples: min_samples.max(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Estimated minutes for an active entry at `position`.
    ///
    /// `hour` is the venue-local hour the estimate is made for.
    pub fn estimate(
        &self,
        position: u32,
        party_size: u32,
        hour: u8,
        settings: &RestaurantQueueSettings,
    ) -> u32 {
        let baseline = |p: u32| baseline_minutes(p, settings.avg_wait_per_party);
        let Some(bands) = self.buckets.get(&(PartySizeClass::of(party_size), hour)) else {
            return baseline(position);
        };

        let curve = |p: u32| {
            let stat = bands[band_of(p)];
            if stat.samples >= self.min_samples {
                stat.ewma.round().max(0.0) as u32
            } else {
                baseline(p)
            }
        };

        // Within a band the curve is flat or linear, so only band edges can
        // break monotonicity
        let horizon = settings.max_queue_size.max(position);
        let edges = POSITION_BANDS
            .iter()
            .take_while(|&&(lo, _)| lo <= horizon)
            .flat_map(|&(lo, hi)| [lo, hi.min(horizon)]);
        let mut prev = 0;
        for p in edges {
            let v = curve(p);
            if v < prev {
                tracing::debug!(
                    restaurant_id = %settings.restaurant_id,
                    hour,
                    position = p,
                    "Learned wait curve not monotonic, using baseline"
                );
                return baseline(position);
            }
            prev = v;
        }
        curve(position)
    }
}

/// Estimator settings
#[derive(Debug, Clone)]
pub struct EstimatorConfig {
    pub alpha: f64,
    pub min_samples: usize,
    pub lookback_hours: u32,
    /// Cached models older than this are rebuilt
    pub ttl: Duration,
}

struct CachedModel {
    model: Arc<HistoryModel>,
    built_at: Instant,
}

/// Per-restaurant model cache in front of the store
pub struct WaitTimeEstimator {
    config: EstimatorConfig,
    cache: DashMap<String, CachedModel>,
}

impl WaitTimeEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            config,
            cache: DashMap::new(),
        }
    }

    /// Current model for a restaurant, rebuilt when stale.
    ///
    /// A store failure degrades to the baseline model instead of failing the
    /// caller's mutation.
    pub async fn model(
        &self,
        store: &dyn QueueStore,
        restaurant_id: &str,
        now: i64,
    ) -> Arc<HistoryModel> {
        if let Some(cached) = self.cache.get(restaurant_id)
            && cached.built_at.elapsed() < self.config.ttl
        {
            return cached.model.clone();
        }

        let since = now - i64::from(self.config.lookback_hours) * 60 * MINUTE_MILLIS;
        let model = match store.list_history(restaurant_id, since).await {
            Ok(history) => Arc::new(HistoryModel::build(
                &history,
                self.config.alpha,
                self.config.min_samples,
            )),
            Err(e) => {
                tracing::warn!(restaurant_id = %restaurant_id, error = %e, "Failed to load queue history, estimating from baseline");
                return Arc::new(HistoryModel::default());
            }
        };

        self.cache.insert(
            restaurant_id.to_string(),
            CachedModel {
                model: model.clone(),
                built_at: Instant::now(),
            },
        );
        model
    }

    /// Drop the cached model so the next estimate sees new history
    pub fn invalidate(&self, restaurant_id: &str) {
        self.cache.remove(restaurant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::QueueHistory;

    fn settings(avg: u32, max: u32) -> RestaurantQueueSettings {
        let mut s = RestaurantQueueSettings::with_defaults("r1");
        s.avg_wait_per_party = avg;
        s.max_queue_size = max;
        s
    }

    fn seated(position: u32, wait: u32, hour: u8, completed_at: i64) -> QueueHistory {
        QueueHistory {
            id: format!("h{completed_at}"),
            queue_entry_id: format!("e{completed_at}"),
            restaurant_id: "r1".into(),
            identity_key: "name:x".into(),
            party_size: 2,
            party_size_class: PartySizeClass::Small,
            wait_duration_minutes: wait,
            final_status: QueueStatus::Seated,
            day_of_week: 0,
            hour_of_day: hour,
            actual_position: 1,
            initial_position: position,
            queue_size_at_join: position,
            joined_at: 0,
            completed_at,
        }
    }

    #[test]
    fn test_baseline() {
        assert_eq!(baseline_minutes(1, 15), 0);
        assert_eq!(baseline_minutes(2, 15), 15);
        assert_eq!(baseline_minutes(5, 10), 40);
        assert_eq!(baseline_minutes(0, 10), 0);
    }

    #[test]
    fn test_band_of() {
        assert_eq!(band_of(1), 0);
        assert_eq!(band_of(3), 1);
        assert_eq!(band_of(5), 2);
        assert_eq!(band_of(10), 3);
        assert_eq!(band_of(20), 4);
        assert_eq!(band_of(500), 5);
    }

    #[test]
    fn test_empty_model_uses_baseline() {
        let model = HistoryModel::default();
        let s = settings(15, 50);
        assert_eq!(model.estimate(1, 2, 12, &s), 0);
        assert_eq!(model.estimate(2, 2, 12, &s), 15);
    }

    #[test]
    fn test_sparse_bucket_falls_back() {
        let history: Vec<_> = (0..3).map(|i| seated(2, 40, 12, i)).collect();
        let model = HistoryModel::build(&history, 0.3, 5);
        assert_eq!(model.estimate(2, 2, 12, &settings(15, 50)), 15);
    }

    #[test]
    fn test_learned_bucket_is_used_when_monotonic() {
        // Band 2-3 learns 20 minutes; band 1 stays on baseline 0,
        // band 4-5 baseline is 45 >= 20.
        let history: Vec<_> = (0..6).map(|i| seated(2, 20, 12, i)).collect();
        let model = HistoryModel::build(&history, 0.3, 5);
        let s = settings(15, 50);
        assert_eq!(model.estimate(2, 2, 12, &s), 20);
        assert_eq!(model.estimate(3, 2, 12, &s), 20);
        assert_eq!(model.estimate(4, 2, 12, &s), 45);
        // Other hour or class: baseline
        assert_eq!(model.estimate(2, 2, 13, &s), 15);
        assert_eq!(model.estimate(2, 6, 12, &s), 15);
    }

    #[test]
    fn test_non_monotonic_bucket_rejected() {
        // Band 2-3 learns 90 minutes but band 4-5 baseline is only 45
        let history: Vec<_> = (0..6).map(|i| seated(2, 90, 12, i)).collect();
        let model = HistoryModel::build(&history, 0.3, 5);
        let s = settings(15, 50);
        assert_eq!(model.estimate(2, 2, 12, &s), 15);
        assert_eq!(model.estimate(4, 2, 12, &s), 45);
    }

    #[test]
    fn test_monotonic_check_at_band_edges_with_large_queue() {
        let s = settings(15, u32::MAX);

        let history: Vec<_> = (0..6).map(|i| seated(2, 20, 12, i)).collect();
        let model = HistoryModel::build(&history, 0.3, 5);
        assert_eq!(model.estimate(2, 2, 12, &s), 20);
        assert_eq!(model.estimate(1_000_000, 2, 12, &s), 999_999 * 15);

        // Band 21+ learns less than the baseline at position 20
        let history: Vec<_> = (0..6).map(|i| seated(30, 100, 12, i)).collect();
        let model = HistoryModel::build(&history, 0.3, 5);
        assert_eq!(model.estimate(30, 2, 12, &s), 29 * 15);
    }

    #[test]
    fn test_ewma_weights_recent_samples() {
        let mut history: Vec<_> = (0..5).map(|i| seated(4, 30, 18, i)).collect();
        history.push(seated(4, 60, 18, 10));
        let model = HistoryModel::build(&history, 0.5, 5);
        // 0.5 * 60 + 0.5 * 30
        assert_eq!(model.estimate(4, 1, 18, &settings(20, 10)), 45);
    }

    #[test]
    fn test_estimates_monotonic_for_every_position() {
        let mut history = Vec::new();
        for (i, (pos, wait)) in [(1, 5), (2, 12), (4, 30), (7, 70), (15, 40)]
            .iter()
            .enumerate()
        {
            for k in 0..6 {
                history.push(seated(*pos, *wait, 20, (i * 10 + k) as i64));
            }
        }
        let model = HistoryModel::build(&history, 0.3, 5);
        let s = settings(10, 40);
        let mut prev = 0;
        for p in 1..=40 {
            let v = model.estimate(p, 2, 20, &s);
            assert!(v >= prev, "position {p}: {v} < {prev}");
            prev = v;
        }
    }

    #[tokio::test]
    async fn test_cache_invalidate_rebuilds() {
        use crate::queue::store::{MemoryQueueStore, QueueMutation};

        let store = MemoryQueueStore::new();
        let estimator = WaitTimeEstimator::new(EstimatorConfig {
            alpha: 0.3,
            min_samples: 1,
            lookback_hours: 24,
            ttl: Duration::from_secs(3600),
        });
        let now = 10 * 60 * MINUTE_MILLIS;

        assert!(estimator.model(&store, "r1", now).await.is_empty());

        let mut m = QueueMutation::new("r1");
        m.history.push(seated(2, 20, 12, now - 1));
        store.commit(m, 0).await.unwrap();

        // Still cached
        assert!(estimator.model(&store, "r1", now).await.is_empty());
        estimator.invalidate("r1");
        assert!(!estimator.model(&store, "r1", now).await.is_empty());
    }
}
