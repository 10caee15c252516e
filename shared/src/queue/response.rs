//! Response payloads

use serde::{Deserialize, Serialize};

use crate::models::{QueueEntry, RestaurantQueueSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinQueueResponse {
    pub queue_entry: QueueEntry,
    pub estimated_wait_minutes: u32,
    pub estimated_seating_time: i64,
    pub current_queue_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub queue_entry: QueueEntry,
    /// 0 once the entry is terminal
    pub current_position: u32,
    pub estimated_wait_minutes: u32,
    pub parties_ahead: u32,
    /// Called and expected at the host stand
    pub is_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveQueueResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallNextResponse {
    pub called_entries: Vec<QueueEntry>,
    /// Entries still WAITING after the call
    pub remaining_queue_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkSeatedResponse {
    pub success: bool,
    pub queue_entry: QueueEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkNoShowResponse {
    pub success: bool,
    /// Recent no-shows for the entry's identity, including this one
    pub user_no_show_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestaurantQueueResponse {
    pub queue_entries: Vec<QueueEntry>,
    pub total_waiting: u32,
    pub total_called: u32,
    /// Mean current estimate of WAITING entries, in minutes
    pub avg_wait_time: f64,
    pub settings: RestaurantQueueSettings,
}
