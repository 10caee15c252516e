//! Restaurant Queue Settings (排队设置)

use chrono::{Datelike, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// 单店排队上限
pub const MAX_QUEUE_SIZE_LIMIT: u32 = 1_000;

/// One opening window of the week.
///
/// `weekday` is 0 = Monday .. 6 = Sunday. `open` / `close` are local
/// `HH:MM` strings. A `close` at or before `open` means the window runs
/// past midnight into the following day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    pub weekday: u8,
    pub open: String,
    pub close: String,
}

impl DaySchedule {
    pub fn new(weekday: u8, open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            weekday,
            open: open.into(),
            close: close.into(),
        }
    }

    fn parse_bounds(&self) -> Option<(NaiveTime, NaiveTime)> {
        let open = NaiveTime::parse_from_str(&self.open, "%H:%M").ok()?;
        let close = NaiveTime::parse_from_str(&self.close, "%H:%M").ok()?;
        Some((open, close))
    }
}

/// Venue opening hours in the venue's own timezone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    /// IANA timezone name, e.g. `Europe/Madrid`
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Empty = always open
    #[serde(default)]
    pub days: Vec<DaySchedule>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            days: Vec::new(),
        }
    }
}

impl WorkingHours {
    /// Parsed timezone, falling back to UTC for unknown names
    pub fn tz(&self) -> Tz {
        self.timezone.parse::<Tz>().unwrap_or(Tz::UTC)
    }

    /// Local `(weekday 0=Mon, hour 0..23)` for a Unix-millis instant
    pub fn local_weekday_hour(&self, millis: i64) -> (u8, u8) {
        match self.tz().timestamp_millis_opt(millis).single() {
            Some(local) => (
                local.weekday().num_days_from_monday() as u8,
                local.hour() as u8,
            ),
            None => (0, 0),
        }
    }

    /// Whether the venue is open at `millis`
    pub fn is_open_at(&self, millis: i64) -> bool {
        if self.days.is_empty() {
            return true;
        }
        let Some(local) = self.tz().timestamp_millis_opt(millis).single() else {
            return false;
        };
        let today = local.weekday().num_days_from_monday() as u8;
        let yesterday = (today + 6) % 7;
        let now = local.time();

        self.days.iter().any(|day| {
            let Some((open, close)) = day.parse_bounds() else {
                return false;
            };
            if open < close {
                day.weekday == today && now >= open && now < close
            } else {
                // 跨午夜：当天 open 之后，或次日 close 之前
                (day.weekday == today && now >= open) || (day.weekday == yesterday && now < close)
            }
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timezone.parse::<Tz>().is_err() {
            return Err(format!("unknown timezone '{}'", self.timezone));
        }
        for day in &self.days {
            if day.weekday > 6 {
                return Err(format!("weekday {} out of range 0..=6", day.weekday));
            }
            if day.parse_bounds().is_none() {
                return Err(format!(
                    "invalid opening window '{}'-'{}', expected HH:MM",
                    day.open, day.close
                ));
            }
        }
        Ok(())
    }
}

/// Per-venue queue configuration.
///
/// Every duration is in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestaurantQueueSettings {
    pub restaurant_id: String,
    pub is_enabled: bool,
    pub max_queue_size: u32,
    pub avg_wait_per_party: u32,
    pub auto_call_enabled: bool,
    pub auto_call_interval: u32,
    #[serde(default)]
    pub working_hours: WorkingHours,
    pub max_party_size: u32,
    /// WAITING entries older than this expire
    pub expiration_time: u32,
    pub no_show_limit: u32,
    pub updated_at: i64,
}

impl RestaurantQueueSettings {
    /// Defaults used when a venue configures its queue for the first time
    pub fn with_defaults(restaurant_id: impl Into<String>) -> Self {
        Self {
            restaurant_id: restaurant_id.into(),
            is_enabled: true,
            max_queue_size: 50,
            avg_wait_per_party: 15,
            auto_call_enabled: false,
            auto_call_interval: 5,
            working_hours: WorkingHours::default(),
            max_party_size: 20,
            expiration_time: 120,
            no_show_limit: 3,
            updated_at: 0,
        }
    }

    /// Open for joins at `millis`
    pub fn accepts_joins_at(&self, millis: i64) -> bool {
        self.is_enabled && self.working_hours.is_open_at(millis)
    }

    /// Merge a partial update in place
    pub fn apply(&mut self, update: QueueSettingsUpdate) {
        if let Some(v) = update.is_enabled {
            self.is_enabled = v;
        }
        if let Some(v) = update.max_queue_size {
            self.max_queue_size = v;
        }
        if let Some(v) = update.avg_wait_per_party {
            self.avg_wait_per_party = v;
        }
        if let Some(v) = update.auto_call_enabled {
            self.auto_call_enabled = v;
        }
        if let Some(v) = update.auto_call_interval {
            self.auto_call_interval = v;
        }
        if let Some(v) = update.working_hours {
            self.working_hours = v;
        }
        if let Some(v) = update.max_party_size {
            self.max_party_size = v;
        }
        if let Some(v) = update.expiration_time {
            self.expiration_time = v;
        }
        if let Some(v) = update.no_show_limit {
            self.no_show_limit = v;
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.restaurant_id.trim().is_empty() {
            return Err("restaurant_id is required".into());
        }
        if self.max_queue_size == 0 || self.max_queue_size > MAX_QUEUE_SIZE_LIMIT {
            return Err(format!(
                "max_queue_size must be between 1 and {MAX_QUEUE_SIZE_LIMIT}"
            ));
        }
        if self.max_party_size == 0 {
            return Err("max_party_size must be at least 1".into());
        }
        if self.auto_call_interval == 0 {
            return Err("auto_call_interval must be at least 1 minute".into());
        }
        if self.expiration_time == 0 {
            return Err("expiration_time must be at least 1 minute".into());
        }
        self.working_hours.validate()
    }
}

/// Partial settings payload for `UpdateQueueSettings`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSettingsUpdate {
    pub is_enabled: Option<bool>,
    pub max_queue_size: Option<u32>,
    pub avg_wait_per_party: Option<u32>,
    pub auto_call_enabled: Option<bool>,
    pub auto_call_interval: Option<u32>,
    pub working_hours: Option<WorkingHours>,
    pub max_party_size: Option<u32>,
    pub expiration_time: Option<u32>,
    pub no_show_limit: Option<u32>,
}
