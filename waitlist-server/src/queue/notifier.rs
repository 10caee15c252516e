//! Notification decider
//!
//! Pure mapping from a queue change to the notifications it should trigger.
//! Nothing here performs I/O; records are persisted with the mutation and
//! handed to the dispatcher after commit.

use shared::models::{
    DeliveryStatus, NotificationType, QueueEntry, QueueNotification, QueueStatus,
};
use shared::util::new_id;

/// Position at or below which a one-time "almost ready" notice fires
pub const ALMOST_READY_THRESHOLD: u32 = 3;

/// A change observed by the aggregate
#[derive(Debug, Clone, Copy)]
pub enum QueueChange<'a> {
    Joined(&'a QueueEntry),
    PositionMoved {
        entry: &'a QueueEntry,
        old_position: u32,
    },
    StatusChanged {
        entry: &'a QueueEntry,
        from: QueueStatus,
    },
    ReminderDue(&'a QueueEntry),
}

/// True when a move lands inside the almost-ready window from outside it
pub fn crosses_almost_ready(old_position: u32, new_position: u32) -> bool {
    new_position <= ALMOST_READY_THRESHOLD && old_position > ALMOST_READY_THRESHOLD
}

pub fn decide(change: QueueChange<'_>) -> Vec<NotificationType> {
    match change {
        QueueChange::Joined(_) => vec![NotificationType::Joined],
        QueueChange::PositionMoved {
            entry,
            old_position,
        } => {
            // Called parties are already at the host stand
            if entry.status != QueueStatus::Waiting || entry.position >= old_position {
                return Vec::new();
            }
            let mut out = vec![NotificationType::PositionUpdate];
            if crosses_almost_ready(old_position, entry.position) {
                out.push(NotificationType::AlmostReady);
            }
            out
        }
        QueueChange::StatusChanged { entry, from } => match (from, entry.status) {
            (QueueStatus::Waiting, QueueStatus::Called) => vec![NotificationType::Ready],
            (_, QueueStatus::Expired) => vec![NotificationType::Expired],
            (_, QueueStatus::Cancelled) => vec![NotificationType::Cancelled],
            _ => Vec::new(),
        },
        QueueChange::ReminderDue(entry) => {
            if entry.status == QueueStatus::Called && entry.reminder_sent_at.is_none() {
                vec![NotificationType::Reminder]
            } else {
                Vec::new()
            }
        }
    }
}

/// Message body for a notification
pub fn render(entry: &QueueEntry, notification_type: NotificationType) -> String {
    let name = entry.display_name();
    match notification_type {
        NotificationType::Joined => format!(
            "Hi {name}, you're #{} in line for a party of {}. Estimated wait: {} min.",
            entry.position, entry.party_size, entry.estimated_wait_minutes
        ),
        NotificationType::PositionUpdate => format!(
            "{name}, you moved up to #{} in line. Estimated wait: {} min.",
            entry.position, entry.estimated_wait_minutes
        ),
        NotificationType::AlmostReady => format!(
            "{name}, you're almost up (#{} in line). Please start heading to the restaurant.",
            entry.position
        ),
        NotificationType::Ready => {
            format!("{name}, your table is ready! Please check in with the host now.")
        }
        NotificationType::Reminder => format!(
            "{name}, your table is still waiting for you. Please check in with the host."
        ),
        NotificationType::Expired => format!(
            "{name}, your spot in line has expired. You're welcome to join again."
        ),
        NotificationType::Cancelled => format!("{name}, you have left the waitlist."),
    }
}

/// Build a pending record, or `None` when the entry opted out of every channel
pub fn build_record(
    entry: &QueueEntry,
    notification_type: NotificationType,
    now: i64,
) -> Option<QueueNotification> {
    if !entry.notify.any() {
        return None;
    }
    Some(QueueNotification {
        id: new_id(),
        queue_entry_id: entry.id.clone(),
        restaurant_id: entry.restaurant_id.clone(),
        notification_type,
        send_sms: entry.notify.sms,
        send_email: entry.notify.email,
        send_push: entry.notify.push,
        phone_number: entry.phone_number.clone(),
        email: entry.email.clone(),
        user_id: entry.user_id.clone(),
        delivery_status: DeliveryStatus::Pending,
        message_content: render(entry, notification_type),
        attempts: 0,
        failure_reason: None,
        created_at: now,
        sent_at: None,
        delivered_at: None,
        updated_at: now,
    })
}
