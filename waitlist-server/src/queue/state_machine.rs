//! Queue entry state machine
//!
//! ```text
//! WAITING ──call──▶ CALLED ──seat────▶ SEATED
//!    │                 │
//!    ├──cancel─┐       ├──no-show─▶ NO_SHOW
//!    │         ▼       │
//!    │     CANCELLED ◀─┘ cancel
//!    └──expire──▶ EXPIRED
//! ```
//!
//! Cancelling an entry that is already terminal is a successful no-op.

use shared::error::ErrorCode;
use shared::models::{QueueEntry, QueueStatus};

use super::error::{QueueError, QueueResult};

/// Requested status change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Call,
    Seat { actual_party_size: Option<u32> },
    Cancel { reason: Option<String> },
    NoShow,
    Expire,
}

impl Transition {
    pub fn target(&self) -> QueueStatus {
        match self {
            Transition::Call => QueueStatus::Called,
            Transition::Seat { .. } => QueueStatus::Seated,
            Transition::Cancel { .. } => QueueStatus::Cancelled,
            Transition::NoShow => QueueStatus::NoShow,
            Transition::Expire => QueueStatus::Expired,
        }
    }
}

/// Outcome of [`apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Entry moved from `from` to its new status
    Changed { from: QueueStatus },
    /// Cancel of an already-terminal entry
    Unchanged,
}

pub fn is_allowed(from: QueueStatus, to: QueueStatus) -> bool {
    use QueueStatus::*;
    matches!(
        (from, to),
        (Waiting, Called)
            | (Waiting, Cancelled)
            | (Waiting, Expired)
            | (Called, Seated)
            | (Called, NoShow)
            | (Called, Cancelled)
    )
}

/// Validate and apply `transition` to `entry` at `now`.
///
/// Only touches status, timestamps and the seated party size; positions are
/// the allocator's business.
pub fn apply(entry: &mut QueueEntry, transition: Transition, now: i64) -> QueueResult<Applied> {
    let from = entry.status;
    let to = transition.target();

    if from.is_terminal() && matches!(transition, Transition::Cancel { .. }) {
        return Ok(Applied::Unchanged);
    }
    if !is_allowed(from, to) {
        return Err(QueueError::ForbiddenTransition { from, to });
    }

    match transition {
        Transition::Call => entry.called_at = Some(now),
        Transition::Seat { actual_party_size } => {
            if let Some(size) = actual_party_size {
                if size == 0 {
                    return Err(QueueError::validation(
                        ErrorCode::PartySizeOutOfRange,
                        "actual_party_size must be at least 1",
                    ));
                }
                entry.party_size = size;
            }
            entry.seated_at = Some(now);
        }
        Transition::Cancel { reason } => {
            entry.cancelled_at = Some(now);
            entry.cancel_reason = reason;
        }
        Transition::NoShow => entry.no_show_at = Some(now),
        Transition::Expire => entry.expired_at = Some(now),
    }
    entry.status = to;
    entry.updated_at = now;
    Ok(Applied::Changed { from })
}
