//! Request payloads

use serde::{Deserialize, Serialize};

use crate::models::{DeliveryStatus, GuestInfo, NotifyChannels, QueuePreferences};

/// `JoinQueue`
///
/// `user_id` is normally filled by the server from the caller's session;
/// anonymous guests identify themselves through `guest_info`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinQueueRequest {
    pub party_size: u32,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub guest_info: Option<GuestInfo>,
    #[serde(default)]
    pub preferences: Option<QueuePreferences>,
    #[serde(default)]
    pub notify: NotifyChannels,
}

/// `LeaveQueue`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaveQueueRequest {
    pub reason: Option<String>,
}

/// `CallNext`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallNextRequest {
    /// Defaults to 1
    pub count: Option<u32>,
}

/// `MarkSeated`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarkSeatedRequest {
    pub actual_party_size: Option<u32>,
}

/// `GetRestaurantQueue` query string, e.g. `?status=WAITING,CALLED`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestaurantQueueQuery {
    pub status: Option<String>,
}

/// `GetQueueAnalytics` query string (Unix millis)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalyticsQuery {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Transport callback for `UpdateNotificationStatus`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNotificationStatusRequest {
    pub status: DeliveryStatus,
    pub failure_reason: Option<String>,
}
