//! Queue events - state deltas published after a mutation commits

use serde::{Deserialize, Serialize};

/// Event pushed to restaurant and entry subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSseEvent {
    pub event_type: QueueEventType,
    /// Entry this event concerns (`None` for aggregate updates)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_entry_id: Option<String>,
    pub restaurant_id: String,
    /// Event payload
    pub data: serde_json::Value,
    /// Server timestamp (Unix milliseconds)
    pub timestamp: i64,
    /// Committed queue version that produced this event.
    /// Monotonic per restaurant; clients detect gaps with it.
    pub sequence: u64,
}

impl QueueSseEvent {
    pub fn new(
        event_type: QueueEventType,
        restaurant_id: impl Into<String>,
        queue_entry_id: Option<String>,
        data: serde_json::Value,
        timestamp: i64,
        sequence: u64,
    ) -> Self {
        Self {
            event_type,
            queue_entry_id,
            restaurant_id: restaurant_id.into(),
            data,
            timestamp,
            sequence,
        }
    }
}

/// Event type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueEventType {
    PositionUpdate,
    StatusChange,
    /// Aggregate queue snapshot / resync hint
    QueueUpdate,
    Called,
    AlmostReady,
    Expired,
}

impl QueueEventType {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueEventType::PositionUpdate => "POSITION_UPDATE",
            QueueEventType::StatusChange => "STATUS_CHANGE",
            QueueEventType::QueueUpdate => "QUEUE_UPDATE",
            QueueEventType::Called => "CALLED",
            QueueEventType::AlmostReady => "ALMOST_READY",
            QueueEventType::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for QueueEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
