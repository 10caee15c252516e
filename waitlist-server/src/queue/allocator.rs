//! Position Allocator - 每家餐厅单写者
//!
//! Every write to a restaurant's queue goes through [`PositionAllocator::mutate`]:
//!
//! 1. take the restaurant's async mutex (foreground requests, auto-call and
//!    sweeps queue up on the same lock)
//! 2. load settings, active entries and the queue version
//! 3. run the operation against a [`RestaurantQueue`]
//! 4. commit the diff with the version check, reloading on conflict
//! 5. route events and notifications, then release the lock
//!
//! The version check still guards against a second process writing the
//! same store.

use std::sync::Arc;

use dashmap::DashMap;
use shared::models::{QueueStatus, RestaurantQueueSettings};
use shared::util::{MINUTE_MILLIS, now_millis};
use tokio::sync::Mutex;

use super::aggregate::{LoadScope, MutationOutcome, RestaurantQueue};
use super::error::{QueueError, QueueResult};
use super::estimator::WaitTimeEstimator;
use super::router::QueueEventRouter;
use super::store::{QueueStore, StoreError};

pub struct PositionAllocator {
    store: Arc<dyn QueueStore>,
    estimator: Arc<WaitTimeEstimator>,
    router: Arc<QueueEventRouter>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    max_retries: u32,
    no_show_window_days: u32,
}

impl PositionAllocator {
    pub fn new(
        store: Arc<dyn QueueStore>,
        estimator: Arc<WaitTimeEstimator>,
        router: Arc<QueueEventRouter>,
        max_retries: u32,
        no_show_window_days: u32,
    ) -> Self {
        Self {
            store,
            estimator,
            router,
            locks: DashMap::new(),
            max_retries,
            no_show_window_days,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        &self.store
    }

    pub fn estimator(&self) -> &Arc<WaitTimeEstimator> {
        &self.estimator
    }

    pub fn router(&self) -> &Arc<QueueEventRouter> {
        &self.router
    }

    fn lock_for(&self, restaurant_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(restaurant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop locks nobody holds or waits on
    pub fn prune_locks(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.locks.len()
    }

    /// Start of the "recent no-shows" window
    fn no_show_since(&self, now: i64) -> i64 {
        now - i64::from(self.no_show_window_days) * 24 * 60 * MINUTE_MILLIS
    }

    async fn load(
        &self,
        restaurant_id: &str,
        scope: &LoadScope,
        now: i64,
    ) -> QueueResult<RestaurantQueue> {
        let settings = self
            .store
            .get_settings(restaurant_id)
            .await?
            .ok_or_else(|| QueueError::settings_not_found(restaurant_id))?;
        let version = self.store.queue_version(restaurant_id).await?;
        let active = self
            .store
            .list_entries(restaurant_id, &QueueStatus::ACTIVE)
            .await?;
        let model = self
            .estimator
            .model(self.store.as_ref(), restaurant_id, now)
            .await;

        let no_shows = match &scope.identity_key {
            Some(identity) => {
                self.store
                    .count_no_shows(restaurant_id, identity, self.no_show_since(now))
                    .await?
            }
            None => 0,
        };
        let target = match &scope.entry_id {
            Some(id) => self.store.get_entry(id).await?,
            None => None,
        };

        Ok(RestaurantQueue::new(settings, active, version, now, model)
            .with_no_show_count(no_shows)
            .with_target(target))
    }

    /// Store `defaults` unless the restaurant already has settings
    pub async fn ensure_settings(&self, defaults: RestaurantQueueSettings) -> QueueResult<()> {
        let lock = self.lock_for(&defaults.restaurant_id);
        let _guard = lock.lock().await;
        if self.store.get_settings(&defaults.restaurant_id).await?.is_none() {
            self.store.put_settings(&defaults).await?;
            tracing::info!(
                restaurant_id = %defaults.restaurant_id,
                "Created queue settings with defaults"
            );
        }
        Ok(())
    }

    /// Run `op` as one serialized, version-checked mutation of a restaurant's queue
    pub async fn mutate<T, F>(
        &self,
        restaurant_id: &str,
        scope: LoadScope,
        mut op: F,
    ) -> QueueResult<(T, MutationOutcome)>
    where
        F: FnMut(&mut RestaurantQueue) -> QueueResult<T>,
    {
        let lock = self.lock_for(restaurant_id);
        let _guard = lock.lock().await;

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let mut queue = self.load(restaurant_id, &scope, now_millis()).await?;
            let value = op(&mut queue)?;
            let expected = queue.version();
            let (mutation, staged) = queue.finish();

            let version = match mutation {
                None => expected,
                Some(mutation) => match self.store.commit(mutation, expected).await {
                    Ok(version) => version,
                    Err(StoreError::VersionConflict { actual, .. }) => {
                        if attempts > self.max_retries {
                            tracing::error!(
                                restaurant_id = %restaurant_id,
                                attempts,
                                "Queue mutation kept conflicting, giving up"
                            );
                            return Err(QueueError::ConcurrencyConflict {
                                restaurant_id: restaurant_id.to_string(),
                                attempts,
                            });
                        }
                        tracing::warn!(
                            restaurant_id = %restaurant_id,
                            expected,
                            actual,
                            attempt = attempts,
                            "Queue version moved, retrying mutation"
                        );
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
            };

            let outcome = staged.into_outcome(version);
            if version != expected {
                self.router.route(&outcome);
            }
            return Ok((value, outcome));
        }
    }
}
