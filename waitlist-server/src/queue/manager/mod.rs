//! QueueManager - 排队引擎入口
//!
//! Public operations of the engine. Reads go straight to the store; every
//! write funnels through the [`PositionAllocator`] so HTTP handlers, the
//! auto-call scheduler and the sweeper are serialized on the same
//! per-restaurant lock.
//!
//! # 操作
//!
//! | Operation | Kind |
//! |-----------|------|
//! | `join_queue` | write |
//! | `get_queue_status` | read |
//! | `leave_queue` | write (idempotent) |
//! | `call_next` / `call_entry` | write |
//! | `mark_seated` / `mark_no_show` | write |
//! | `get_restaurant_queue` | read |
//! | `update_queue_settings` | write (settings + estimate refresh) |
//! | `get_analytics` | read |
//! | `update_notification_status` | notification record write |

use std::sync::Arc;

use shared::error::ErrorCode;
use shared::models::{
    DeliveryStatus, QueueAnalytics, QueueEntry, QueueNotification, QueueSettingsUpdate,
    QueueStatus, RestaurantQueueSettings,
};
use shared::queue::{
    CallNextResponse, JoinQueueRequest, JoinQueueResponse, LeaveQueueResponse,
    MarkNoShowResponse, MarkSeatedResponse, QueueStatusResponse,
    RestaurantQueueResponse,
};
use shared::util::{MINUTE_MILLIS, now_millis};

use super::aggregate::{EntryDraft, LoadScope, MutationOutcome, TransitionOutcome};
use super::allocator::PositionAllocator;
use super::analytics::compute_analytics;
use super::error::{QueueError, QueueResult};
use super::router::QueueEventRouter;
use super::state_machine::Transition;
use super::store::QueueStore;

/// Default analytics window
const ANALYTICS_DEFAULT_DAYS: i64 = 7;

pub struct QueueManager {
    allocator: PositionAllocator,
    reminder_after_minutes: u32,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("reminder_after_minutes", &self.reminder_after_minutes)
            .finish_non_exhaustive()
    }
}

/// Parse `?status=WAITING,CALLED`. Empty or absent means active entries.
pub fn parse_status_filter(raw: Option<&str>) -> QueueResult<Vec<QueueStatus>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(QueueStatus::ACTIVE.to_vec());
    };
    let mut statuses = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let status = part
            .parse::<QueueStatus>()
            .map_err(|e| QueueError::validation(ErrorCode::InvalidRequest, e))?;
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }
    Ok(statuses)
}

impl QueueManager {
    pub fn new(allocator: PositionAllocator, reminder_after_minutes: u32) -> Self {
        Self {
            allocator,
            reminder_after_minutes,
        }
    }

    pub fn store(&self) -> &Arc<dyn QueueStore> {
        self.allocator.store()
    }

    pub fn router(&self) -> &Arc<QueueEventRouter> {
        self.allocator.router()
    }

    pub fn allocator(&self) -> &PositionAllocator {
        &self.allocator
    }

    async fn load_entry(&self, entry_id: &str) -> QueueResult<QueueEntry> {
        self.store()
            .get_entry(entry_id)
            .await?
            .ok_or_else(|| QueueError::entry_not_found(entry_id))
    }

    async fn transition(
        &self,
        entry_id: &str,
        transition: Transition,
    ) -> QueueResult<(TransitionOutcome, MutationOutcome)> {
        let entry = self.load_entry(entry_id).await?;
        let scope = LoadScope {
            identity_key: matches!(transition, Transition::NoShow)
                .then(|| entry.identity_key.clone()),
            entry_id: Some(entry.id.clone()),
        };
        self.allocator
            .mutate(&entry.restaurant_id, scope, |q| {
                q.transition(entry_id, transition.clone())
            })
            .await
    }

    // ========== Customer operations ==========

    pub async fn join_queue(
        &self,
        restaurant_id: &str,
        request: JoinQueueRequest,
    ) -> QueueResult<JoinQueueResponse> {
        let draft = EntryDraft {
            user_id: request.user_id,
            guest: request.guest_info.unwrap_or_default(),
            party_size: request.party_size,
            preferences: request.preferences,
            notify: request.notify,
        };
        let scope = LoadScope {
            identity_key: Some(draft.identity_key()?),
            entry_id: None,
        };

        let (entry, outcome) = self
            .allocator
            .mutate(restaurant_id, scope, |q| q.join(draft.clone()))
            .await?;

        tracing::info!(
            restaurant_id = %restaurant_id,
            entry_id = %entry.id,
            position = entry.position,
            party_size = entry.party_size,
            estimated_wait_minutes = entry.estimated_wait_minutes,
            "Party joined queue"
        );
        Ok(JoinQueueResponse {
            estimated_wait_minutes: entry.estimated_wait_minutes,
            estimated_seating_time: entry.estimated_seating_time,
            current_queue_size: outcome.active_count,
            queue_entry: entry,
        })
    }

    pub async fn get_queue_status(&self, entry_id: &str) -> QueueResult<QueueStatusResponse> {
        let entry = self.load_entry(entry_id).await?;
        let active = entry.is_active();
        Ok(QueueStatusResponse {
            current_position: if active { entry.position } else { 0 },
            estimated_wait_minutes: if active {
                entry.estimated_wait_minutes
            } else {
                0
            },
            parties_ahead: if active {
                entry.position.saturating_sub(1)
            } else {
                0
            },
            is_ready: entry.status == QueueStatus::Called,
            queue_entry: entry,
        })
    }

    /// Cancel an entry. Already-terminal entries succeed without change.
    pub async fn leave_queue(
        &self,
        entry_id: &str,
        reason: Option<String>,
    ) -> QueueResult<LeaveQueueResponse> {
        let entry = self.load_entry(entry_id).await?;
        if entry.status.is_terminal() {
            return Ok(LeaveQueueResponse {
                success: true,
                message: format!("Entry already {}", entry.status),
            });
        }

        let (result, _) = self
            .transition(entry_id, Transition::Cancel { reason })
            .await?;
        let message = match &result {
            TransitionOutcome::Changed(_) => "Left the queue".to_string(),
            TransitionOutcome::AlreadyTerminal(e) => format!("Entry already {}", e.status),
        };
        tracing::info!(entry_id = %entry_id, restaurant_id = %entry.restaurant_id, "Party left queue");
        Ok(LeaveQueueResponse {
            success: true,
            message,
        })
    }

    // ========== Staff operations ==========

    pub async fn call_next(
        &self,
        restaurant_id: &str,
        count: Option<u32>,
    ) -> QueueResult<CallNextResponse> {
        let count = count.unwrap_or(1);
        if count == 0 {
            return Err(QueueError::validation(
                ErrorCode::ValueOutOfRange,
                "count must be at least 1",
            ));
        }
        let (called, outcome) = self
            .allocator
            .mutate(restaurant_id, LoadScope::default(), |q| q.call_next(count))
            .await?;

        if !called.is_empty() {
            crate::audit_log!(
                "call_next",
                format!("restaurant:{restaurant_id}"),
                format!("called={}", called.len())
            );
        }
        Ok(CallNextResponse {
            called_entries: called,
            remaining_queue_size: outcome.waiting_count,
        })
    }

    /// Call one specific WAITING entry out of order
    pub async fn call_entry(&self, entry_id: &str) -> QueueResult<QueueEntry> {
        let (result, _) = self.transition(entry_id, Transition::Call).await?;
        crate::audit_log!("call_entry", format!("entry:{entry_id}"));
        Ok(result.entry().clone())
    }

    pub async fn mark_seated(
        &self,
        entry_id: &str,
        actual_party_size: Option<u32>,
    ) -> QueueResult<MarkSeatedResponse> {
        let (result, _) = self
            .transition(entry_id, Transition::Seat { actual_party_size })
            .await?;
        crate::audit_log!("mark_seated", format!("entry:{entry_id}"));
        Ok(MarkSeatedResponse {
            success: true,
            queue_entry: result.entry().clone(),
        })
    }

    pub async fn mark_no_show(&self, entry_id: &str) -> QueueResult<MarkNoShowResponse> {
        let entry = self.load_entry(entry_id).await?;
        let scope = LoadScope {
            identity_key: Some(entry.identity_key.clone()),
            entry_id: Some(entry.id.clone()),
        };
        let (count, _) = self
            .allocator
            .mutate(&entry.restaurant_id, scope, |q| {
                q.transition(entry_id, Transition::NoShow)?;
                Ok(q.no_show_count())
            })
            .await?;

        crate::audit_log!(
            "mark_no_show",
            format!("entry:{entry_id}"),
            format!("identity_no_shows={count}")
        );
        Ok(MarkNoShowResponse {
            success: true,
            user_no_show_count: count,
        })
    }

    pub async fn get_restaurant_queue(
        &self,
        restaurant_id: &str,
        status_filter: Option<&str>,
    ) -> QueueResult<RestaurantQueueResponse> {
        let settings = self.get_settings(restaurant_id).await?;
        let statuses = parse_status_filter(status_filter)?;
        let queue_entries = self.store().list_entries(restaurant_id, &statuses).await?;

        let active = self
            .store()
            .list_entries(restaurant_id, &QueueStatus::ACTIVE)
            .await?;
        let waiting: Vec<&QueueEntry> = active
            .iter()
            .filter(|e| e.status == QueueStatus::Waiting)
            .collect();
        let avg_wait_time = if waiting.is_empty() {
            0.0
        } else {
            waiting
                .iter()
                .map(|e| f64::from(e.estimated_wait_minutes))
                .sum::<f64>()
                / waiting.len() as f64
        };

        Ok(RestaurantQueueResponse {
            queue_entries,
            total_waiting: waiting.len() as u32,
            total_called: (active.len() - waiting.len()) as u32,
            avg_wait_time,
            settings,
        })
    }

    // ========== Settings ==========

    pub async fn get_settings(&self, restaurant_id: &str) -> QueueResult<RestaurantQueueSettings> {
        self.store()
            .get_settings(restaurant_id)
            .await?
            .ok_or_else(|| QueueError::settings_not_found(restaurant_id))
    }

    /// Merge a partial update, creating the venue with defaults on first use.
    ///
    /// Runs as a queue mutation so the new limits are checked against the
    /// active entries and re-estimated before the lock is released.
    pub async fn update_queue_settings(
        &self,
        restaurant_id: &str,
        update: QueueSettingsUpdate,
    ) -> QueueResult<RestaurantQueueSettings> {
        let mut candidate = RestaurantQueueSettings::with_defaults(restaurant_id);
        candidate.apply(update.clone());
        candidate
            .validate()
            .map_err(|e| QueueError::validation(ErrorCode::ValidationFailed, e))?;
        self.allocator
            .ensure_settings(RestaurantQueueSettings::with_defaults(restaurant_id))
            .await?;

        let (settings, outcome) = self
            .allocator
            .mutate(restaurant_id, LoadScope::default(), |q| {
                q.update_settings(update.clone())
            })
            .await?;
        crate::audit_log!("update_queue_settings", format!("restaurant:{restaurant_id}"));
        tracing::debug!(
            restaurant_id = %restaurant_id,
            version = outcome.version,
            "Queue settings updated"
        );
        Ok(settings)
    }

    // ========== Analytics & notifications ==========

    pub async fn get_analytics(
        &self,
        restaurant_id: &str,
        from: Option<i64>,
        to: Option<i64>,
    ) -> QueueResult<QueueAnalytics> {
        let end = to.unwrap_or_else(now_millis);
        let start = from.unwrap_or(end - ANALYTICS_DEFAULT_DAYS * 24 * 60 * MINUTE_MILLIS);
        if start > end {
            return Err(QueueError::validation(
                ErrorCode::InvalidRequest,
                "from must not be after to",
            ));
        }
        self.get_settings(restaurant_id).await?;
        let history = self.store().list_history(restaurant_id, start).await?;
        Ok(compute_analytics(restaurant_id, &history, start, end))
    }

    pub async fn list_notifications(&self, entry_id: &str) -> QueueResult<Vec<QueueNotification>> {
        self.load_entry(entry_id).await?;
        Ok(self.store().list_notifications(entry_id).await?)
    }

    /// Transport callback
    pub async fn update_notification_status(
        &self,
        notification_id: &str,
        status: DeliveryStatus,
        failure_reason: Option<String>,
    ) -> QueueResult<QueueNotification> {
        let mut record = self
            .store()
            .get_notification(notification_id)
            .await?
            .ok_or_else(|| QueueError::notification_not_found(notification_id))?;

        if status == DeliveryStatus::Pending {
            return Err(QueueError::validation(
                ErrorCode::InvalidRequest,
                "status cannot be reset to pending",
            ));
        }
        if record.delivery_status.is_final() && record.delivery_status != status {
            return Err(QueueError::validation(
                ErrorCode::InvalidRequest,
                format!("notification is already {:?}", record.delivery_status).to_lowercase(),
            ));
        }

        let now = now_millis();
        match status {
            DeliveryStatus::Sent => {
                record.sent_at.get_or_insert(now);
            }
            DeliveryStatus::Delivered => {
                record.sent_at.get_or_insert(now);
                record.delivered_at = Some(now);
            }
            DeliveryStatus::Failed => {
                record.failure_reason = failure_reason.or(record.failure_reason.take());
            }
            DeliveryStatus::Pending => {}
        }
        record.delivery_status = status;
        record.updated_at = now;
        self.store().update_notification(&record).await?;

        if status == DeliveryStatus::Failed {
            tracing::warn!(
                notification_id = %notification_id,
                reason = ?record.failure_reason,
                "Transport reported delivery failure"
            );
        }
        Ok(record)
    }

    // ========== Background operations ==========

    /// Expire WAITING entries past `expiration_time`
    pub async fn expire_due(&self, restaurant_id: &str) -> QueueResult<Vec<String>> {
        let (expired, _) = self
            .allocator
            .mutate(restaurant_id, LoadScope::default(), |q| q.expire_due())
            .await?;
        if !expired.is_empty() {
            tracing::info!(restaurant_id = %restaurant_id, count = expired.len(), "Expired stale queue entries");
        }
        Ok(expired)
    }

    /// Queue REMINDER notifications for entries CALLED too long ago
    pub async fn remind_due(&self, restaurant_id: &str) -> QueueResult<Vec<String>> {
        let window = self.reminder_after_minutes;
        let (reminded, _) = self
            .allocator
            .mutate(restaurant_id, LoadScope::default(), |q| Ok(q.remind_due(window)))
            .await?;
        Ok(reminded)
    }

    /// Recompute every active entry's estimate against the latest model
    pub async fn refresh_estimates(&self, restaurant_id: &str) -> QueueResult<MutationOutcome> {
        let (_, outcome) = self
            .allocator
            .mutate(restaurant_id, LoadScope::default(), |_| Ok(()))
            .await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests;
