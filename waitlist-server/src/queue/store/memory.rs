//! In-memory queue store
//!
//! Backs demo mode and the engine tests. Commits take the write lock for
//! the whole mutation, so they are atomic with respect to readers.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared::models::{
    DeliveryStatus, QueueEntry, QueueHistory, QueueNotification, QueueStatus,
    RestaurantQueueSettings,
};

use super::{NoShowRecord, QueueMutation, QueueStore, StoreError, StoreResult, sort_entries};

#[derive(Default)]
struct Inner {
    settings: HashMap<String, RestaurantQueueSettings>,
    entries: HashMap<String, QueueEntry>,
    versions: HashMap<String, u64>,
    history: Vec<QueueHistory>,
    no_shows: Vec<NoShowRecord>,
    /// Insertion order, so equal timestamps list stably
    notifications: Vec<QueueNotification>,
}

#[derive(Default)]
pub struct MemoryQueueStore {
    inner: RwLock<Inner>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn get_settings(
        &self,
        restaurant_id: &str,
    ) -> StoreResult<Option<RestaurantQueueSettings>> {
        Ok(self.inner.read().settings.get(restaurant_id).cloned())
    }

    async fn put_settings(&self, settings: &RestaurantQueueSettings) -> StoreResult<()> {
        self.inner
            .write()
            .settings
            .insert(settings.restaurant_id.clone(), settings.clone());
        Ok(())
    }

    async fn list_restaurants(&self) -> StoreResult<Vec<RestaurantQueueSettings>> {
        let mut out: Vec<_> = self.inner.read().settings.values().cloned().collect();
        out.sort_by(|a, b| a.restaurant_id.cmp(&b.restaurant_id));
        Ok(out)
    }

    async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<QueueEntry>> {
        Ok(self.inner.read().entries.get(entry_id).cloned())
    }

    async fn list_entries(
        &self,
        restaurant_id: &str,
        statuses: &[QueueStatus],
    ) -> StoreResult<Vec<QueueEntry>> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .entries
            .values()
            .filter(|e| e.restaurant_id == restaurant_id)
            .filter(|e| statuses.is_empty() || statuses.contains(&e.status))
            .cloned()
            .collect();
        sort_entries(&mut out);
        Ok(out)
    }

    async fn queue_version(&self, restaurant_id: &str) -> StoreResult<u64> {
        Ok(self
            .inner
            .read()
            .versions
            .get(restaurant_id)
            .copied()
            .unwrap_or(0))
    }

    async fn commit(&self, mutation: QueueMutation, expected_version: u64) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let actual = inner
            .versions
            .get(&mutation.restaurant_id)
            .copied()
            .unwrap_or(0);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                restaurant_id: mutation.restaurant_id,
                expected: expected_version,
                actual,
            });
        }

        for entry in mutation.entries {
            inner.entries.insert(entry.id.clone(), entry);
        }
        inner.history.extend(mutation.history);
        inner.no_shows.extend(mutation.no_shows);
        inner.notifications.extend(mutation.notifications);
        if let Some(settings) = mutation.settings {
            inner.settings.insert(settings.restaurant_id.clone(), settings);
        }

        let next = actual + 1;
        inner.versions.insert(mutation.restaurant_id, next);
        Ok(next)
    }

    async fn list_history(
        &self,
        restaurant_id: &str,
        since: i64,
    ) -> StoreResult<Vec<QueueHistory>> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .history
            .iter()
            .filter(|h| h.restaurant_id == restaurant_id && h.completed_at >= since)
            .cloned()
            .collect();
        out.sort_by_key(|h| h.completed_at);
        Ok(out)
    }

    async fn count_no_shows(
        &self,
        restaurant_id: &str,
        identity_key: &str,
        since: i64,
    ) -> StoreResult<u32> {
        let count = self
            .inner
            .read()
            .no_shows
            .iter()
            .filter(|r| {
                r.restaurant_id == restaurant_id
                    && r.identity_key == identity_key
                    && r.recorded_at >= since
            })
            .count();
        Ok(count as u32)
    }

    async fn get_notification(&self, id: &str) -> StoreResult<Option<QueueNotification>> {
        Ok(self
            .inner
            .read()
            .notifications
            .iter()
            .find(|n| n.id == id)
            .cloned())
    }

    async fn list_notifications(&self, entry_id: &str) -> StoreResult<Vec<QueueNotification>> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .notifications
            .iter()
            .filter(|n| n.queue_entry_id == entry_id)
            .cloned()
            .collect();
        out.sort_by_key(|n| n.created_at);
        Ok(out)
    }

    async fn list_pending_notifications(
        &self,
        created_before: i64,
        limit: usize,
    ) -> StoreResult<Vec<QueueNotification>> {
        let mut out: Vec<_> = self
            .inner
            .read()
            .notifications
            .iter()
            .filter(|n| n.delivery_status == DeliveryStatus::Pending)
            .filter(|n| n.created_at <= created_before)
            .cloned()
            .collect();
        out.sort_by_key(|n| n.created_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn update_notification(&self, record: &QueueNotification) -> StoreResult<()> {
        let mut inner = self.inner.write();
        match inner.notifications.iter_mut().find(|n| n.id == record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("notification {}", record.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        contract::settings_roundtrip(&MemoryQueueStore::new()).await;
    }

    #[tokio::test]
    async fn test_commit_checks_version() {
        contract::commit_checks_version(&MemoryQueueStore::new()).await;
    }

    #[tokio::test]
    async fn test_history_and_no_shows() {
        contract::history_and_no_shows(&MemoryQueueStore::new()).await;
    }

    #[tokio::test]
    async fn test_notification_lifecycle() {
        contract::notification_lifecycle(&MemoryQueueStore::new()).await;
    }
}
