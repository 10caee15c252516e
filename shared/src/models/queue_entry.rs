//! Queue Entry Model (排队记录)

use serde::{Deserialize, Serialize};

/// Lifecycle status of a queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Waiting,
    Called,
    Seated,
    Cancelled,
    NoShow,
    Expired,
}

impl QueueStatus {
    /// Statuses that occupy a position slot
    pub const ACTIVE: [QueueStatus; 2] = [QueueStatus::Waiting, QueueStatus::Called];

    pub fn is_active(self) -> bool {
        matches!(self, QueueStatus::Waiting | QueueStatus::Called)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QueueStatus::Waiting => "WAITING",
            QueueStatus::Called => "CALLED",
            QueueStatus::Seated => "SEATED",
            QueueStatus::Cancelled => "CANCELLED",
            QueueStatus::NoShow => "NO_SHOW",
            QueueStatus::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "WAITING" => Ok(QueueStatus::Waiting),
            "CALLED" => Ok(QueueStatus::Called),
            "SEATED" => Ok(QueueStatus::Seated),
            "CANCELLED" => Ok(QueueStatus::Cancelled),
            "NO_SHOW" => Ok(QueueStatus::NoShow),
            "EXPIRED" => Ok(QueueStatus::Expired),
            other => Err(format!("unknown queue status '{other}'")),
        }
    }
}

/// Party size class used for estimate bucketing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartySizeClass {
    /// 1-2
    Small,
    /// 3-4
    Medium,
    /// 5-6
    Large,
    /// 7+
    Xlarge,
}

impl PartySizeClass {
    pub fn of(party_size: u32) -> Self {
        match party_size {
            0..=2 => PartySizeClass::Small,
            3..=4 => PartySizeClass::Medium,
            5..=6 => PartySizeClass::Large,
            _ => PartySizeClass::Xlarge,
        }
    }
}

/// Optional seating preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePreferences {
    /// e.g. "terrace", "indoor", "bar"
    pub seating_area: Option<String>,
    #[serde(default)]
    pub high_chair: bool,
    #[serde(default)]
    pub wheelchair_accessible: bool,
    pub notes: Option<String>,
}

/// Guest contact supplied when the caller has no user account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestInfo {
    pub guest_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
}

/// Channels an entry opted into
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyChannels {
    #[serde(default)]
    pub sms: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
}

impl NotifyChannels {
    pub fn any(&self) -> bool {
        self.sms || self.email || self.push
    }
}

/// One party waiting at one venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    pub restaurant_id: String,
    pub user_id: Option<String>,
    pub guest_name: Option<String>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    /// Derived identity for duplicate and no-show checks
    pub identity_key: String,
    pub party_size: u32,
    /// Rank among active entries; frozen once terminal
    pub position: u32,
    pub estimated_wait_minutes: u32,
    pub estimated_seating_time: i64,
    pub status: QueueStatus,
    pub preferences: Option<QueuePreferences>,
    #[serde(default)]
    pub notify: NotifyChannels,
    pub joined_at: i64,
    pub called_at: Option<i64>,
    pub seated_at: Option<i64>,
    pub cancelled_at: Option<i64>,
    pub no_show_at: Option<i64>,
    pub expired_at: Option<i64>,
    pub cancel_reason: Option<String>,
    pub reminder_sent_at: Option<i64>,
    /// Position assigned at join
    pub initial_position: u32,
    /// Active entries including this one right after join
    pub queue_size_at_join: u32,
    pub updated_at: i64,
}

impl QueueEntry {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Timestamp of the terminal transition, if any
    pub fn completed_at(&self) -> Option<i64> {
        match self.status {
            QueueStatus::Seated => self.seated_at,
            QueueStatus::Cancelled => self.cancelled_at,
            QueueStatus::NoShow => self.no_show_at,
            QueueStatus::Expired => self.expired_at,
            QueueStatus::Waiting | QueueStatus::Called => None,
        }
    }

    /// Display name for message templates
    pub fn display_name(&self) -> &str {
        self.guest_name.as_deref().unwrap_or("Guest")
    }
}

/// Derive the identity key for an entry.
///
/// Preference order: account id, phone (digits and a leading `+`), email
/// (lower-cased), guest name (trimmed, lower-cased). Returns `None` when
/// no usable channel is present.
pub fn identity_key(
    user_id: Option<&str>,
    guest: &GuestInfo,
) -> Option<String> {
    if let Some(uid) = user_id.map(str::trim).filter(|s| !s.is_empty()) {
        return Some(format!("user:{uid}"));
    }
    if let Some(phone) = guest.phone_number.as_deref().and_then(normalize_phone) {
        return Some(format!("phone:{phone}"));
    }
    if let Some(email) = guest
        .email
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return Some(format!("email:{}", email.to_lowercase()));
    }
    guest
        .guest_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|name| format!("name:{}", name.to_lowercase()))
}

fn normalize_phone(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len());
    if trimmed.starts_with('+') {
        out.push('+');
    }
    out.extend(trimmed.chars().filter(|c| c.is_ascii_digit()));
    if out.trim_start_matches('+').is_empty() {
        None
    } else {
        Some(out)
    }
}
