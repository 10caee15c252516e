//! Queue Notification Model (通知记录)

use serde::{Deserialize, Serialize};

/// What the guest is being told
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    Joined,
    PositionUpdate,
    AlmostReady,
    Ready,
    Reminder,
    Expired,
    Cancelled,
}

impl NotificationType {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::Joined => "JOINED",
            NotificationType::PositionUpdate => "POSITION_UPDATE",
            NotificationType::AlmostReady => "ALMOST_READY",
            NotificationType::Ready => "READY",
            NotificationType::Reminder => "REMINDER",
            NotificationType::Expired => "EXPIRED",
            NotificationType::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    /// No further transport updates expected
    pub fn is_final(self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Sms,
    Email,
    Push,
}

/// Delivery record for one notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueNotification {
    pub id: String,
    pub queue_entry_id: String,
    pub restaurant_id: String,
    pub notification_type: NotificationType,
    pub send_sms: bool,
    pub send_email: bool,
    pub send_push: bool,
    /// Contact targets copied at creation so the transport needs no lookup
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub user_id: Option<String>,
    pub delivery_status: DeliveryStatus,
    pub message_content: String,
    #[serde(default)]
    pub attempts: u32,
    pub failure_reason: Option<String>,
    pub created_at: i64,
    pub sent_at: Option<i64>,
    pub delivered_at: Option<i64>,
    pub updated_at: i64,
}

impl QueueNotification {
    pub fn channels(&self) -> Vec<DeliveryChannel> {
        let mut out = Vec::with_capacity(3);
        if self.send_sms {
            out.push(DeliveryChannel::Sms);
        }
        if self.send_email {
            out.push(DeliveryChannel::Email);
        }
        if self.send_push {
            out.push(DeliveryChannel::Push);
        }
        out
    }
}
