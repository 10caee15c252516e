//! redb-based queue store
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `settings` | `restaurant_id` | `RestaurantQueueSettings` | Venue configuration |
//! | `entries` | `entry_id` | `QueueEntry` | All entries, never deleted |
//! | `restaurant_entries` | `restaurant_id` | `entry_id` (multimap) | Per-venue index |
//! | `active_entries` | `restaurant_id` | `entry_id` (multimap) | WAITING / CALLED index |
//! | `queue_versions` | `restaurant_id` | `u64` | Optimistic concurrency |
//! | `history` | `(restaurant_id, completed_at, id)` | `QueueHistory` | Append-only |
//! | `no_shows` | `(restaurant_id, identity_key)` | `recorded_at` (multimap) | No-show counter |
//! | `notifications` | `id` | `QueueNotification` | Delivery records |
//! | `entry_notifications` | `entry_id` | `notification_id` (multimap) | Per-entry index |
//! | `pending_notifications` | `id` | `created_at` | Undelivered queue |
//!
//! Values are JSON. Each [`QueueStore::commit`] is one write transaction,
//! so the version check and every write of a mutation land together.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{
    Database, MultimapTableDefinition, ReadableDatabase, ReadableMultimapTable, ReadableTable,
    TableDefinition,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::models::{
    DeliveryStatus, QueueEntry, QueueHistory, QueueNotification, QueueStatus,
    RestaurantQueueSettings,
};

use super::{QueueMutation, QueueStore, StoreError, StoreResult, sort_entries};

const SETTINGS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("settings");
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const RESTAURANT_ENTRIES: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("restaurant_entries");
const ACTIVE_ENTRIES: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("active_entries");
const VERSIONS_TABLE: TableDefinition<&str, u64> = TableDefinition::new("queue_versions");
const HISTORY_TABLE: TableDefinition<(&str, i64, &str), &[u8]> = TableDefinition::new("history");
const NO_SHOWS_TABLE: MultimapTableDefinition<(&str, &str), i64> =
    MultimapTableDefinition::new("no_shows");
const NOTIFICATIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("notifications");
const ENTRY_NOTIFICATIONS: MultimapTableDefinition<&str, &str> =
    MultimapTableDefinition::new("entry_notifications");
const PENDING_NOTIFICATIONS: TableDefinition<&str, i64> =
    TableDefinition::new("pending_notifications");

macro_rules! backend_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(e: $ty) -> Self {
                    StoreError::Backend(e.to_string())
                }
            }
        )*
    };
}

backend_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Durable queue store backed by redb
#[derive(Clone)]
pub struct RedbQueueStore {
    db: Arc<Database>,
}

impl RedbQueueStore {
    /// Open or create the database at `path`.
    ///
    /// redb commits are durable once `commit()` returns (copy-on-write with
    /// an atomic root swap), so a crash never leaves a half-applied mutation.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// In-memory backend (for tests)
    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StoreResult<Self> {
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(SETTINGS_TABLE)?;
            let _ = txn.open_table(ENTRIES_TABLE)?;
            let _ = txn.open_multimap_table(RESTAURANT_ENTRIES)?;
            let _ = txn.open_multimap_table(ACTIVE_ENTRIES)?;
            let _ = txn.open_table(VERSIONS_TABLE)?;
            let _ = txn.open_table(HISTORY_TABLE)?;
            let _ = txn.open_multimap_table(NO_SHOWS_TABLE)?;
            let _ = txn.open_table(NOTIFICATIONS_TABLE)?;
            let _ = txn.open_multimap_table(ENTRY_NOTIFICATIONS)?;
            let _ = txn.open_table(PENDING_NOTIFICATIONS)?;
        }
        txn.commit()?;
        Ok(Self { db: Arc::new(db) })
    }

    fn read_notification(&self, id: &str) -> StoreResult<Option<QueueNotification>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(NOTIFICATIONS_TABLE)?;
        table.get(id)?.map(|v| decode(v.value())).transpose()
    }
}

#[async_trait]
impl QueueStore for RedbQueueStore {
    async fn get_settings(
        &self,
        restaurant_id: &str,
    ) -> StoreResult<Option<RestaurantQueueSettings>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS_TABLE)?;
        table.get(restaurant_id)?.map(|v| decode(v.value())).transpose()
    }

    async fn put_settings(&self, settings: &RestaurantQueueSettings) -> StoreResult<()> {
        let bytes = encode(settings)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS_TABLE)?;
            table.insert(settings.restaurant_id.as_str(), bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    async fn list_restaurants(&self) -> StoreResult<Vec<RestaurantQueueSettings>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS_TABLE)?;
        let mut out = Vec::new();
        for item in table.iter()? {
            let (_key, value) = item?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<QueueEntry>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(ENTRIES_TABLE)?;
        table.get(entry_id)?.map(|v| decode(v.value())).transpose()
    }

    async fn list_entries(
        &self,
        restaurant_id: &str,
        statuses: &[QueueStatus],
    ) -> StoreResult<Vec<QueueEntry>> {
        let txn = self.db.begin_read()?;
        let entries = txn.open_table(ENTRIES_TABLE)?;
        let only_active = !statuses.is_empty() && statuses.iter().all(|s| s.is_active());
        let index = if only_active {
            txn.open_multimap_table(ACTIVE_ENTRIES)?
        } else {
            txn.open_multimap_table(RESTAURANT_ENTRIES)?
        };

        let mut out = Vec::new();
        for id in index.get(restaurant_id)? {
            let id = id?;
            let Some(raw) = entries.get(id.value())? else {
                continue;
            };
            let entry: QueueEntry = decode(raw.value())?;
            if statuses.is_empty() || statuses.contains(&entry.status) {
                out.push(entry);
            }
        }
        sort_entries(&mut out);
        Ok(out)
    }

    async fn queue_version(&self, restaurant_id: &str) -> StoreResult<u64> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VERSIONS_TABLE)?;
        Ok(table.get(restaurant_id)?.map(|v| v.value()).unwrap_or(0))
    }

    async fn commit(&self, mutation: QueueMutation, expected_version: u64) -> StoreResult<u64> {
        let rid = mutation.restaurant_id.as_str();
        let txn = self.db.begin_write()?;
        let next = {
            let mut versions = txn.open_table(VERSIONS_TABLE)?;
            let actual = versions.get(rid)?.map(|v| v.value()).unwrap_or(0);
            if actual != expected_version {
                // Dropping the uncommitted transaction aborts it
                return Err(StoreError::VersionConflict {
                    restaurant_id: rid.to_string(),
                    expected: expected_version,
                    actual,
                });
            }
            let next = actual + 1;
            versions.insert(rid, next)?;
            next
        };

        {
            let mut entries = txn.open_table(ENTRIES_TABLE)?;
            let mut by_restaurant = txn.open_multimap_table(RESTAURANT_ENTRIES)?;
            let mut active = txn.open_multimap_table(ACTIVE_ENTRIES)?;
            for entry in &mutation.entries {
                let bytes = encode(entry)?;
                entries.insert(entry.id.as_str(), bytes.as_slice())?;
                by_restaurant.insert(entry.restaurant_id.as_str(), entry.id.as_str())?;
                if entry.is_active() {
                    active.insert(entry.restaurant_id.as_str(), entry.id.as_str())?;
                } else {
                    active.remove(entry.restaurant_id.as_str(), entry.id.as_str())?;
                }
            }
        }

        {
            let mut history = txn.open_table(HISTORY_TABLE)?;
            for row in &mutation.history {
                let bytes = encode(row)?;
                history.insert(
                    (row.restaurant_id.as_str(), row.completed_at, row.id.as_str()),
                    bytes.as_slice(),
                )?;
            }
        }

        {
            let mut no_shows = txn.open_multimap_table(NO_SHOWS_TABLE)?;
            for record in &mutation.no_shows {
                no_shows.insert(
                    (record.restaurant_id.as_str(), record.identity_key.as_str()),
                    record.recorded_at,
                )?;
            }
        }

        {
            let mut notifications = txn.open_table(NOTIFICATIONS_TABLE)?;
            let mut by_entry = txn.open_multimap_table(ENTRY_NOTIFICATIONS)?;
            let mut pending = txn.open_table(PENDING_NOTIFICATIONS)?;
            for record in &mutation.notifications {
                let bytes = encode(record)?;
                notifications.insert(record.id.as_str(), bytes.as_slice())?;
                by_entry.insert(record.queue_entry_id.as_str(), record.id.as_str())?;
                if record.delivery_status == DeliveryStatus::Pending {
                    pending.insert(record.id.as_str(), record.created_at)?;
                }
            }
        }

        if let Some(settings) = &mutation.settings {
            let bytes = encode(settings)?;
            let mut table = txn.open_table(SETTINGS_TABLE)?;
            table.insert(settings.restaurant_id.as_str(), bytes.as_slice())?;
        }

        txn.commit()?;
        Ok(next)
    }

    async fn list_history(
        &self,
        restaurant_id: &str,
        since: i64,
    ) -> StoreResult<Vec<QueueHistory>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(HISTORY_TABLE)?;
        let mut out = Vec::new();
        for item in table.range((restaurant_id, since, "")..(restaurant_id, i64::MAX, ""))? {
            let (_key, value) = item?;
            out.push(decode(value.value())?);
        }
        Ok(out)
    }

    async fn count_no_shows(
        &self,
        restaurant_id: &str,
        identity_key: &str,
        since: i64,
    ) -> StoreResult<u32> {
        let txn = self.db.begin_read()?;
        let table = txn.open_multimap_table(NO_SHOWS_TABLE)?;
        let mut count = 0;
        for at in table.get((restaurant_id, identity_key))? {
            if at?.value() >= since {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_notification(&self, id: &str) -> StoreResult<Option<QueueNotification>> {
        self.read_notification(id)
    }

    async fn list_notifications(&self, entry_id: &str) -> StoreResult<Vec<QueueNotification>> {
        let txn = self.db.begin_read()?;
        let index = txn.open_multimap_table(ENTRY_NOTIFICATIONS)?;
        let table = txn.open_table(NOTIFICATIONS_TABLE)?;
        let mut out: Vec<QueueNotification> = Vec::new();
        for id in index.get(entry_id)? {
            let id = id?;
            if let Some(raw) = table.get(id.value())? {
                out.push(decode(raw.value())?);
            }
        }
        out.sort_by_key(|n| n.created_at);
        Ok(out)
    }

    async fn list_pending_notifications(
        &self,
        created_before: i64,
        limit: usize,
    ) -> StoreResult<Vec<QueueNotification>> {
        let txn = self.db.begin_read()?;
        let pending = txn.open_table(PENDING_NOTIFICATIONS)?;
        let table = txn.open_table(NOTIFICATIONS_TABLE)?;

        let mut ids: Vec<(i64, String)> = Vec::new();
        for item in pending.iter()? {
            let (id, created_at) = item?;
            if created_at.value() <= created_before {
                ids.push((created_at.value(), id.value().to_string()));
            }
        }
        ids.sort();

        let mut out = Vec::new();
        for (_, id) in ids.into_iter().take(limit) {
            if let Some(raw) = table.get(id.as_str())? {
                out.push(decode(raw.value())?);
            }
        }
        Ok(out)
    }

    async fn update_notification(&self, record: &QueueNotification) -> StoreResult<()> {
        let bytes = encode(record)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(NOTIFICATIONS_TABLE)?;
            if table.get(record.id.as_str())?.is_none() {
                return Err(StoreError::NotFound(format!("notification {}", record.id)));
            }
            table.insert(record.id.as_str(), bytes.as_slice())?;

            let mut pending = txn.open_table(PENDING_NOTIFICATIONS)?;
            if record.delivery_status == DeliveryStatus::Pending {
                pending.insert(record.id.as_str(), record.created_at)?;
            } else {
                pending.remove(record.id.as_str())?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[tokio::test]
    async fn test_settings_roundtrip() {
        contract::settings_roundtrip(&RedbQueueStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_commit_checks_version() {
        contract::commit_checks_version(&RedbQueueStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_history_and_no_shows() {
        contract::history_and_no_shows(&RedbQueueStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_notification_lifecycle() {
        contract::notification_lifecycle(&RedbQueueStore::open_in_memory().unwrap()).await;
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.redb");
        {
            let store = RedbQueueStore::open(&path).unwrap();
            let mut m = QueueMutation::new("r1");
            m.entries
                .push(contract::entry("r1", "a", 1, QueueStatus::Waiting));
            store.commit(m, 0).await.unwrap();
        }

        let store = RedbQueueStore::open(&path).unwrap();
        assert_eq!(store.queue_version("r1").await.unwrap(), 1);
        let active = store
            .list_entries("r1", &QueueStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "a");
    }

    #[tokio::test]
    async fn test_terminal_entry_leaves_active_index() {
        let store = RedbQueueStore::open_in_memory().unwrap();
        let mut m = QueueMutation::new("r1");
        m.entries
            .push(contract::entry("r1", "a", 1, QueueStatus::Waiting));
        store.commit(m, 0).await.unwrap();

        let mut m = QueueMutation::new("r1");
        m.entries
            .push(contract::entry("r1", "a", 1, QueueStatus::Cancelled));
        store.commit(m, 1).await.unwrap();

        assert!(
            store
                .list_entries("r1", &QueueStatus::ACTIVE)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(store.list_entries("r1", &[]).await.unwrap().len(), 1);
    }
}
