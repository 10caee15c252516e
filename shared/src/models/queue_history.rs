//! Queue History Model
//!
//! Write-once snapshot of an entry that reached a terminal status.

use serde::{Deserialize, Serialize};

use super::queue_entry::{PartySizeClass, QueueEntry, QueueStatus};
use super::queue_settings::WorkingHours;
use crate::util::minutes_between;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueHistory {
    pub id: String,
    pub queue_entry_id: String,
    pub restaurant_id: String,
    pub identity_key: String,
    pub party_size: u32,
    pub party_size_class: PartySizeClass,
    pub wait_duration_minutes: u32,
    pub final_status: QueueStatus,
    /// Venue-local weekday of the join, 0 = Monday
    pub day_of_week: u8,
    /// Venue-local hour of the join
    pub hour_of_day: u8,
    /// Position held when the entry completed
    pub actual_position: u32,
    pub initial_position: u32,
    pub queue_size_at_join: u32,
    pub joined_at: i64,
    pub completed_at: i64,
}

impl QueueHistory {
    /// Snapshot a terminal entry. Returns `None` while the entry is active.
    pub fn from_entry(id: String, entry: &QueueEntry, hours: &WorkingHours) -> Option<Self> {
        let completed_at = entry.completed_at()?;
        let (day_of_week, hour_of_day) = hours.local_weekday_hour(entry.joined_at);
        Some(Self {
            id,
            queue_entry_id: entry.id.clone(),
            restaurant_id: entry.restaurant_id.clone(),
            identity_key: entry.identity_key.clone(),
            party_size: entry.party_size,
            party_size_class: PartySizeClass::of(entry.party_size),
            wait_duration_minutes: minutes_between(entry.joined_at, completed_at)
                .try_into()
                .unwrap_or(u32::MAX),
            final_status: entry.status,
            day_of_week,
            hour_of_day,
            actual_position: entry.position,
            initial_position: entry.initial_position,
            queue_size_at_join: entry.queue_size_at_join,
            joined_at: entry.joined_at,
            completed_at,
        })
    }
}
