//! Queue store port
//!
//! The engine only talks to storage through [`QueueStore`]. Two backends
//! are provided and picked from configuration:
//!
//! - [`MemoryQueueStore`] - in-process fixture for demos and tests
//! - [`RedbQueueStore`] - embedded durable store
//!
//! Writes go through [`QueueStore::commit`], which applies one
//! [`QueueMutation`] atomically and only if the restaurant's queue version
//! still matches what the caller loaded.

mod memory;
mod redb_store;

pub use memory::MemoryQueueStore;
pub use redb_store::RedbQueueStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{
    QueueEntry, QueueHistory, QueueNotification, QueueStatus, RestaurantQueueSettings,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Version conflict for restaurant {restaurant_id}: expected {expected}, found {actual}")]
    VersionConflict {
        restaurant_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One recorded no-show, counted per (restaurant, identity)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoShowRecord {
    pub restaurant_id: String,
    pub identity_key: String,
    pub queue_entry_id: String,
    pub recorded_at: i64,
}

/// Everything a single queue operation writes
#[derive(Debug, Clone, Default)]
pub struct QueueMutation {
    pub restaurant_id: String,
    /// Upserted entries
    pub entries: Vec<QueueEntry>,
    /// Appended history rows
    pub history: Vec<QueueHistory>,
    /// New notification records (pending)
    pub notifications: Vec<QueueNotification>,
    pub no_shows: Vec<NoShowRecord>,
    /// Replaced settings, written in the same transaction
    pub settings: Option<RestaurantQueueSettings>,
}

impl QueueMutation {
    pub fn new(restaurant_id: impl Into<String>) -> Self {
        Self {
            restaurant_id: restaurant_id.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
            && self.history.is_empty()
            && self.notifications.is_empty()
            && self.no_shows.is_empty()
            && self.settings.is_none()
    }
}

/// Transactional storage consumed by the engine
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn get_settings(&self, restaurant_id: &str)
    -> StoreResult<Option<RestaurantQueueSettings>>;

    async fn put_settings(&self, settings: &RestaurantQueueSettings) -> StoreResult<()>;

    /// All configured restaurants
    async fn list_restaurants(&self) -> StoreResult<Vec<RestaurantQueueSettings>>;

    async fn get_entry(&self, entry_id: &str) -> StoreResult<Option<QueueEntry>>;

    /// Entries of a restaurant whose status is in `statuses` (all when empty),
    /// ordered by position then join time
    async fn list_entries(
        &self,
        restaurant_id: &str,
        statuses: &[QueueStatus],
    ) -> StoreResult<Vec<QueueEntry>>;

    /// Current queue version (0 for a restaurant never written)
    async fn queue_version(&self, restaurant_id: &str) -> StoreResult<u64>;

    /// Apply `mutation` atomically if the version is still `expected_version`.
    /// Returns the new version.
    async fn commit(&self, mutation: QueueMutation, expected_version: u64) -> StoreResult<u64>;

    /// History rows completed at or after `since`
    async fn list_history(&self, restaurant_id: &str, since: i64)
    -> StoreResult<Vec<QueueHistory>>;

    /// No-shows recorded at or after `since`
    async fn count_no_shows(
        &self,
        restaurant_id: &str,
        identity_key: &str,
        since: i64,
    ) -> StoreResult<u32>;

    async fn get_notification(&self, id: &str) -> StoreResult<Option<QueueNotification>>;

    async fn list_notifications(&self, entry_id: &str) -> StoreResult<Vec<QueueNotification>>;

    /// Pending records created at or before `created_before`, oldest first
    async fn list_pending_notifications(
        &self,
        created_before: i64,
        limit: usize,
    ) -> StoreResult<Vec<QueueNotification>>;

    async fn update_notification(&self, record: &QueueNotification) -> StoreResult<()>;
}

pub(crate) fn sort_entries(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then(a.joined_at.cmp(&b.joined_at))
            .then_with(|| a.id.cmp(&b.id))
    });
}
