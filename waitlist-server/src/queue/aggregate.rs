//! Per-restaurant queue aggregate
//!
//! A [`RestaurantQueue`] is a snapshot of one venue's active entries loaded
//! under the restaurant lock. Operations mutate it synchronously and record
//! what changed; [`RestaurantQueue::finish`] recomputes estimates, derives
//! position changes, notifications and events, and produces the
//! [`QueueMutation`] to commit.
//!
//! Invariant kept by every operation: active entries sorted by position
//! hold exactly `1..=N`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use shared::error::ErrorCode;
use shared::models::{
    GuestInfo, NotifyChannels, QueueEntry, QueueHistory, QueueNotification, QueuePreferences,
    QueueSettingsUpdate, QueueStatus, RestaurantQueueSettings, identity_key,
};
use shared::queue::{QueueEventType, QueueSseEvent};
use shared::util::{MINUTE_MILLIS, new_id};

use super::error::{QueueError, QueueResult};
use super::estimator::HistoryModel;
use super::notifier::{self, QueueChange};
use super::state_machine::{self, Applied, Transition};
use super::store::{NoShowRecord, QueueMutation};

/// Validated join input
#[derive(Debug, Clone, Default)]
pub struct EntryDraft {
    pub user_id: Option<String>,
    pub guest: GuestInfo,
    pub party_size: u32,
    pub preferences: Option<QueuePreferences>,
    pub notify: NotifyChannels,
}

impl EntryDraft {
    pub fn identity_key(&self) -> QueueResult<String> {
        identity_key(self.user_id.as_deref(), &self.guest).ok_or_else(|| {
            QueueError::validation(
                ErrorCode::IdentityRequired,
                "user_id, phone_number, email or guest_name is required",
            )
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionChange {
    pub entry_id: String,
    pub old_position: u32,
    pub new_position: u32,
}

/// Result of a transition request
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Changed(QueueEntry),
    /// Cancel of an entry that was already terminal
    AlreadyTerminal(QueueEntry),
}

impl TransitionOutcome {
    pub fn entry(&self) -> &QueueEntry {
        match self {
            TransitionOutcome::Changed(e) | TransitionOutcome::AlreadyTerminal(e) => e,
        }
    }
}

/// Extra state read under the lock for the operation at hand
#[derive(Debug, Clone, Default)]
pub struct LoadScope {
    /// Count recent no-shows of this identity
    pub identity_key: Option<String>,
    /// Read this entry even if it is no longer active
    pub entry_id: Option<String>,
}

#[derive(Debug, Clone)]
struct StagedEvent {
    event_type: QueueEventType,
    entry_id: Option<String>,
    data: serde_json::Value,
}

/// Everything produced by one operation except the committed version
#[derive(Debug, Clone, Default)]
pub struct StagedOutcome {
    restaurant_id: String,
    timestamp: i64,
    changed_entries: Vec<QueueEntry>,
    position_changes: Vec<PositionChange>,
    history: Vec<QueueHistory>,
    notifications: Vec<QueueNotification>,
    events: Vec<StagedEvent>,
    active_count: u32,
    waiting_count: u32,
}

impl StagedOutcome {
    pub fn into_outcome(self, version: u64) -> MutationOutcome {
        let events = self
            .events
            .into_iter()
            .map(|e| {
                QueueSseEvent::new(
                    e.event_type,
                    self.restaurant_id.clone(),
                    e.entry_id,
                    e.data,
                    self.timestamp,
                    version,
                )
            })
            .collect();
        MutationOutcome {
            restaurant_id: self.restaurant_id,
            version,
            changed_entries: self.changed_entries,
            position_changes: self.position_changes,
            history: self.history,
            notifications: self.notifications,
            events,
            active_count: self.active_count,
            waiting_count: self.waiting_count,
        }
    }
}

/// What a committed operation changed
#[derive(Debug, Clone, Default)]
pub struct MutationOutcome {
    pub restaurant_id: String,
    /// Queue version after commit (unchanged for no-op operations)
    pub version: u64,
    pub changed_entries: Vec<QueueEntry>,
    pub position_changes: Vec<PositionChange>,
    pub history: Vec<QueueHistory>,
    pub notifications: Vec<QueueNotification>,
    pub events: Vec<QueueSseEvent>,
    /// WAITING + CALLED after the operation
    pub active_count: u32,
    pub waiting_count: u32,
}

impl MutationOutcome {
    pub fn entry(&self, id: &str) -> Option<&QueueEntry> {
        self.changed_entries.iter().find(|e| e.id == id)
    }

    pub fn is_noop(&self) -> bool {
        self.changed_entries.is_empty() && self.notifications.is_empty()
    }
}

pub struct RestaurantQueue {
    settings: RestaurantQueueSettings,
    active: Vec<QueueEntry>,
    version: u64,
    now: i64,
    model: Arc<HistoryModel>,
    no_show_count: u32,
    target: Option<QueueEntry>,
    settings_replaced: bool,

    original: HashMap<String, u32>,
    touched: HashSet<String>,
    departed: Vec<QueueEntry>,
    history: Vec<QueueHistory>,
    notifications: Vec<QueueNotification>,
    no_shows: Vec<NoShowRecord>,
    events: Vec<StagedEvent>,
}

impl RestaurantQueue {
    /// Assemble from loaded state. `active` may arrive in any order.
    pub fn new(
        settings: RestaurantQueueSettings,
        mut active: Vec<QueueEntry>,
        version: u64,
        now: i64,
        model: Arc<HistoryModel>,
    ) -> Self {
        active.retain(|e| e.is_active());
        active.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then(a.joined_at.cmp(&b.joined_at))
        });
        let original = active
            .iter()
            .map(|e| (e.id.clone(), e.position))
            .collect();
        let mut queue = Self {
            settings,
            active,
            version,
            now,
            model,
            no_show_count: 0,
            target: None,
            settings_replaced: false,
            original,
            touched: HashSet::new(),
            departed: Vec::new(),
            history: Vec::new(),
            notifications: Vec::new(),
            no_shows: Vec::new(),
            events: Vec::new(),
        };
        queue.normalize_positions();
        queue
    }

    pub fn with_no_show_count(mut self, count: u32) -> Self {
        self.no_show_count = count;
        self
    }

    pub fn with_target(mut self, entry: Option<QueueEntry>) -> Self {
        self.target = entry;
        self
    }

    pub fn restaurant_id(&self) -> &str {
        &self.settings.restaurant_id
    }

    pub fn settings(&self) -> &RestaurantQueueSettings {
        &self.settings
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn active(&self) -> &[QueueEntry] {
        &self.active
    }

    pub fn no_show_count(&self) -> u32 {
        self.no_show_count
    }

    pub fn waiting_count(&self) -> u32 {
        self.active
            .iter()
            .filter(|e| e.status == QueueStatus::Waiting)
            .count() as u32
    }

    /// Repair stored positions that are not exactly `1..=N`
    fn normalize_positions(&mut self) {
        for (idx, entry) in self.active.iter_mut().enumerate() {
            let expected = idx as u32 + 1;
            if entry.position != expected {
                tracing::warn!(
                    restaurant_id = %entry.restaurant_id,
                    entry_id = %entry.id,
                    stored = entry.position,
                    expected,
                    "Repairing non-contiguous queue position"
                );
                entry.position = expected;
            }
        }
    }

    fn estimate(&self, position: u32, party_size: u32) -> u32 {
        let (_, hour) = self.settings.working_hours.local_weekday_hour(self.now);
        self.model
            .estimate(position, party_size, hour, &self.settings)
    }

    fn notify(&mut self, change: QueueChange<'_>) {
        let entry = match change {
            QueueChange::Joined(e)
            | QueueChange::PositionMoved { entry: e, .. }
            | QueueChange::StatusChanged { entry: e, .. }
            | QueueChange::ReminderDue(e) => e,
        };
        for notification_type in notifier::decide(change) {
            if let Some(record) = notifier::build_record(entry, notification_type, self.now) {
                self.notifications.push(record);
            }
        }
    }

    fn emit(&mut self, event_type: QueueEventType, entry_id: Option<&str>, data: serde_json::Value) {
        self.events.push(StagedEvent {
            event_type,
            entry_id: entry_id.map(str::to_string),
            data,
        });
    }

    // ========== Operations ==========

    /// Add a party at the end of the queue
    pub fn join(&mut self, draft: EntryDraft) -> QueueResult<QueueEntry> {
        let identity = draft.identity_key()?;
        let rid = self.settings.restaurant_id.clone();

        if !self.settings.is_enabled {
            return Err(QueueError::QueueClosed {
                restaurant_id: rid,
                code: ErrorCode::QueueDisabled,
                reason: "queue is disabled".into(),
            });
        }
        if !self.settings.working_hours.is_open_at(self.now) {
            return Err(QueueError::QueueClosed {
                restaurant_id: rid,
                code: ErrorCode::OutsideWorkingHours,
                reason: "outside working hours".into(),
            });
        }
        if draft.party_size == 0 || draft.party_size > self.settings.max_party_size {
            return Err(QueueError::validation(
                ErrorCode::PartySizeOutOfRange,
                format!(
                    "party_size must be between 1 and {}",
                    self.settings.max_party_size
                ),
            ));
        }
        let limit = self.settings.no_show_limit;
        if limit > 0 && self.no_show_count >= limit {
            return Err(QueueError::TooManyNoShows {
                count: self.no_show_count,
                limit,
            });
        }
        if self.active.len() as u32 >= self.settings.max_queue_size {
            return Err(QueueError::QueueFull {
                max_queue_size: self.settings.max_queue_size,
            });
        }
        if let Some(existing) = self.active.iter().find(|e| e.identity_key == identity) {
            return Err(QueueError::DuplicateEntry {
                existing_entry_id: existing.id.clone(),
            });
        }

        let position = self.active.len() as u32 + 1;
        let wait = self.estimate(position, draft.party_size);
        let entry = QueueEntry {
            id: new_id(),
            restaurant_id: rid,
            user_id: draft.user_id,
            guest_name: draft.guest.guest_name,
            phone_number: draft.guest.phone_number,
            email: draft.guest.email,
            identity_key: identity,
            party_size: draft.party_size,
            position,
            estimated_wait_minutes: wait,
            estimated_seating_time: self.now + i64::from(wait) * MINUTE_MILLIS,
            status: QueueStatus::Waiting,
            preferences: draft.preferences,
            notify: draft.notify,
            joined_at: self.now,
            called_at: None,
            seated_at: None,
            cancelled_at: None,
            no_show_at: None,
            expired_at: None,
            cancel_reason: None,
            reminder_sent_at: None,
            initial_position: position,
            queue_size_at_join: position,
            updated_at: self.now,
        };

        self.touched.insert(entry.id.clone());
        self.notify(QueueChange::Joined(&entry));
        self.emit(
            QueueEventType::StatusChange,
            Some(&entry.id),
            json!({ "status": entry.status, "position": position, "entry": &entry }),
        );
        self.active.push(entry.clone());
        Ok(entry)
    }

    /// Apply a status change to an entry of this restaurant
    pub fn transition(
        &mut self,
        entry_id: &str,
        transition: Transition,
    ) -> QueueResult<TransitionOutcome> {
        let Some(idx) = self.active.iter().position(|e| e.id == entry_id) else {
            return self.transition_inactive(entry_id, transition);
        };

        if let Transition::Seat {
            actual_party_size: Some(size),
        } = &transition
            && *size > self.settings.max_party_size
        {
            return Err(QueueError::validation(
                ErrorCode::PartySizeOutOfRange,
                format!(
                    "party_size must be between 1 and {}",
                    self.settings.max_party_size
                ),
            ));
        }

        let mut entry = self.active[idx].clone();
        let from = match state_machine::apply(&mut entry, transition, self.now)? {
            Applied::Changed { from } => from,
            Applied::Unchanged => return Ok(TransitionOutcome::AlreadyTerminal(entry)),
        };

        if entry.is_active() {
            self.active[idx] = entry.clone();
            self.touched.insert(entry.id.clone());
        } else {
            self.active.remove(idx);
            // Close the gap: everyone behind moves up by exactly one
            for behind in &mut self.active[idx..] {
                behind.position -= 1;
            }
            if let Some(row) =
                QueueHistory::from_entry(new_id(), &entry, &self.settings.working_hours)
            {
                self.history.push(row);
            }
            if entry.status == QueueStatus::NoShow {
                self.no_shows.push(NoShowRecord {
                    restaurant_id: entry.restaurant_id.clone(),
                    identity_key: entry.identity_key.clone(),
                    queue_entry_id: entry.id.clone(),
                    recorded_at: self.now,
                });
                self.no_show_count += 1;
            }
            self.departed.push(entry.clone());
        }

        self.notify(QueueChange::StatusChanged {
            entry: &entry,
            from,
        });
        match entry.status {
            QueueStatus::Called => self.emit(
                QueueEventType::Called,
                Some(&entry.id),
                json!({ "position": entry.position, "called_at": entry.called_at }),
            ),
            QueueStatus::Expired => self.emit(
                QueueEventType::Expired,
                Some(&entry.id),
                json!({ "expired_at": entry.expired_at }),
            ),
            _ => {}
        }
        self.emit(
            QueueEventType::StatusChange,
            Some(&entry.id),
            json!({ "from": from, "status": entry.status, "entry": &entry }),
        );

        tracing::debug!(
            restaurant_id = %entry.restaurant_id,
            entry_id = %entry.id,
            from = %from,
            to = %entry.status,
            "Queue entry transitioned"
        );
        Ok(TransitionOutcome::Changed(entry))
    }

    fn transition_inactive(
        &mut self,
        entry_id: &str,
        transition: Transition,
    ) -> QueueResult<TransitionOutcome> {
        let Some(target) = self
            .target
            .as_ref()
            .filter(|e| e.id == entry_id && e.restaurant_id == self.settings.restaurant_id)
        else {
            return Err(QueueError::entry_not_found(entry_id));
        };
        if target.is_active() {
            // Stored as active but not part of the loaded queue snapshot
            return Err(QueueError::entry_not_found(entry_id));
        }
        let mut copy = target.clone();
        match state_machine::apply(&mut copy, transition, self.now)? {
            Applied::Unchanged => Ok(TransitionOutcome::AlreadyTerminal(target.clone())),
            Applied::Changed { .. } => Err(QueueError::entry_not_found(entry_id)),
        }
    }

    /// Call the first `count` WAITING entries in position order
    pub fn call_next(&mut self, count: u32) -> QueueResult<Vec<QueueEntry>> {
        let mut called = Vec::new();
        for _ in 0..count {
            let Some(next) = self
                .active
                .iter()
                .find(|e| e.status == QueueStatus::Waiting)
                .map(|e| e.id.clone())
            else {
                break;
            };
            if let TransitionOutcome::Changed(entry) = self.transition(&next, Transition::Call)? {
                called.push(entry);
            }
        }
        Ok(called)
    }

    /// Expire WAITING entries older than `expiration_time`
    pub fn expire_due(&mut self) -> QueueResult<Vec<String>> {
        let cutoff = self.now - i64::from(self.settings.expiration_time) * MINUTE_MILLIS;
        let due: Vec<String> = self
            .active
            .iter()
            .filter(|e| e.status == QueueStatus::Waiting && e.joined_at < cutoff)
            .map(|e| e.id.clone())
            .collect();
        for id in &due {
            self.transition(id, Transition::Expire)?;
        }
        Ok(due)
    }

    /// Mark CALLED entries past the reminder window, once each
    pub fn remind_due(&mut self, window_minutes: u32) -> Vec<String> {
        let cutoff = self.now - i64::from(window_minutes) * MINUTE_MILLIS;
        let mut reminded = Vec::new();
        for idx in 0..self.active.len() {
            let due = {
                let e = &self.active[idx];
                e.status == QueueStatus::Called
                    && e.reminder_sent_at.is_none()
                    && e.called_at.is_some_and(|at| at <= cutoff)
            };
            if !due {
                continue;
            }
            let snapshot = self.active[idx].clone();
            self.notify(QueueChange::ReminderDue(&snapshot));

            let entry = &mut self.active[idx];
            entry.reminder_sent_at = Some(self.now);
            entry.updated_at = self.now;
            reminded.push(entry.id.clone());
        }
        self.touched.extend(reminded.iter().cloned());
        reminded
    }

    /// Merge a settings update; the queue must still fit the new limit
    pub fn update_settings(
        &mut self,
        update: QueueSettingsUpdate,
    ) -> QueueResult<RestaurantQueueSettings> {
        let mut settings = self.settings.clone();
        settings.apply(update);
        settings.updated_at = self.now;
        settings
            .validate()
            .map_err(|e| QueueError::validation(ErrorCode::ValidationFailed, e))?;

        let active = self.active.len() as u32;
        if settings.max_queue_size < active {
            return Err(QueueError::validation(
                ErrorCode::ValidationFailed,
                format!(
                    "max_queue_size {} is below the {} parties already in the queue",
                    settings.max_queue_size, active
                ),
            ));
        }

        self.settings = settings.clone();
        self.settings_replaced = true;
        Ok(settings)
    }

    // ========== Finalisation ==========

    /// Recompute estimates, derive diffs and build the mutation.
    ///
    /// Returns `None` for the mutation when nothing needs writing.
    pub fn finish(mut self) -> (Option<QueueMutation>, StagedOutcome) {
        let now = self.now;
        let estimates: Vec<u32> = self
            .active
            .iter()
            .map(|e| self.estimate(e.position, e.party_size))
            .collect();

        let mut changed_ids: Vec<String> = Vec::new();
        let mut position_changes = Vec::new();
        let mut moved: Vec<(QueueEntry, u32)> = Vec::new();

        for (entry, wait) in self.active.iter_mut().zip(estimates) {
            let estimate_changed = entry.estimated_wait_minutes != wait;
            if estimate_changed {
                entry.estimated_wait_minutes = wait;
                entry.estimated_seating_time = now + i64::from(wait) * MINUTE_MILLIS;
            }
            let old_position = self.original.get(&entry.id).copied();
            let position_changed = old_position.is_some_and(|p| p != entry.position);

            if position_changed || estimate_changed {
                entry.updated_at = now;
                if let Some(old) = old_position {
                    moved.push((entry.clone(), old));
                }
            }
            if position_changed {
                position_changes.push(PositionChange {
                    entry_id: entry.id.clone(),
                    old_position: old_position.unwrap_or(entry.position),
                    new_position: entry.position,
                });
            }
            if position_changed || estimate_changed || self.touched.contains(&entry.id) {
                changed_ids.push(entry.id.clone());
            }
        }

        for (entry, old_position) in &moved {
            if *old_position != entry.position {
                self.notify(QueueChange::PositionMoved {
                    entry,
                    old_position: *old_position,
                });
            }
            self.emit(
                QueueEventType::PositionUpdate,
                Some(&entry.id),
                json!({
                    "old_position": old_position,
                    "position": entry.position,
                    "estimated_wait_minutes": entry.estimated_wait_minutes,
                    "estimated_seating_time": entry.estimated_seating_time,
                }),
            );
            if entry.status == QueueStatus::Waiting
                && notifier::crosses_almost_ready(*old_position, entry.position)
            {
                self.emit(
                    QueueEventType::AlmostReady,
                    Some(&entry.id),
                    json!({ "position": entry.position }),
                );
            }
        }

        let mut changed_entries: Vec<QueueEntry> = self
            .active
            .iter()
            .filter(|e| changed_ids.contains(&e.id))
            .cloned()
            .collect();
        changed_entries.extend(self.departed.iter().cloned());

        let active_count = self.active.len() as u32;
        let waiting_count = self.waiting_count();
        let anything_changed = !changed_entries.is_empty()
            || !self.notifications.is_empty()
            || self.settings_replaced;
        if anything_changed {
            let mut data = json!({
                "current_queue_size": active_count,
                "total_waiting": waiting_count,
                "total_called": active_count - waiting_count,
            });
            if self.settings_replaced {
                data["settings"] = json!(&self.settings);
            }
            self.emit(QueueEventType::QueueUpdate, None, data);
        }

        let mutation = anything_changed.then(|| QueueMutation {
            restaurant_id: self.settings.restaurant_id.clone(),
            entries: changed_entries.clone(),
            history: self.history.clone(),
            notifications: self.notifications.clone(),
            no_shows: std::mem::take(&mut self.no_shows),
            settings: self.settings_replaced.then(|| self.settings.clone()),
        });

        let staged = StagedOutcome {
            restaurant_id: self.settings.restaurant_id,
            timestamp: now,
            changed_entries,
            position_changes,
            history: self.history,
            notifications: self.notifications,
            events: if anything_changed {
                self.events
            } else {
                Vec::new()
            },
            active_count,
            waiting_count,
        };
        (mutation, staged)
    }
}
