//! Queue Position & Notification Engine
//!
//! ```text
//! HTTP / scheduler / sweeper
//!          │
//!          ▼
//!    QueueManager ──► PositionAllocator (per-restaurant lock + version check)
//!                          │  RestaurantQueue: state machine, positions,
//!                          │  estimator, notification decider
//!                          ▼
//!                     QueueStore::commit
//!                          │
//!                          ▼
//!                   QueueEventRouter
//!                     ├── QueueBroadcaster (SSE)
//!                     ├── NotificationDispatcher
//!                     └── AnalyticsAggregator
//! ```

pub mod aggregate;
pub mod allocator;
pub mod analytics;
pub mod broadcaster;
pub mod dispatch;
pub mod error;
pub mod estimator;
pub mod manager;
pub mod notifier;
pub mod router;
pub mod scheduler;
pub mod state_machine;
pub mod store;
pub mod sweeper;

pub use allocator::PositionAllocator;
pub use analytics::{AnalyticsAggregator, RollingStats, compute_analytics};
pub use broadcaster::{EventReceiver, QueueBroadcaster};
pub use dispatch::{LogTransport, NotificationDispatcher, NotificationTransport};
pub use error::{QueueError, QueueResult};
pub use estimator::{EstimatorConfig, WaitTimeEstimator};
pub use manager::QueueManager;
pub use router::{EventChannels, QueueEventRouter};
pub use scheduler::AutoCallScheduler;
pub use store::{MemoryQueueStore, QueueStore, RedbQueueStore};
pub use sweeper::QueueSweeper;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;
    use std::time::Duration;

    use shared::models::RestaurantQueueSettings;

    use super::*;

    /// Manager over an in-memory store with one configured restaurant
    pub async fn manager_with(settings: RestaurantQueueSettings) -> Arc<QueueManager> {
        let store: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());
        store.put_settings(&settings).await.unwrap();
        let (router, _channels) = QueueEventRouter::new(Arc::new(QueueBroadcaster::new(64)), 64, 64);
        let estimator = Arc::new(WaitTimeEstimator::new(EstimatorConfig {
            alpha: 0.3,
            min_samples: 5,
            lookback_hours: 336,
            ttl: Duration::from_secs(300),
        }));
        let allocator = PositionAllocator::new(store, estimator, Arc::new(router), 3, 30);
        Arc::new(QueueManager::new(allocator, 5))
    }
}
