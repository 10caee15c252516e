use shared::error::{AppError, ErrorCode};
use shared::models::QueueStatus;
use thiserror::Error;

use super::store::StoreError;

/// Engine errors
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Validation failed: {message}")]
    Validation { code: ErrorCode, message: String },

    /// Venue disabled or outside working hours
    #[error("Queue closed for restaurant {restaurant_id}: {reason}")]
    QueueClosed {
        restaurant_id: String,
        code: ErrorCode,
        reason: String,
    },

    #[error("Queue is full ({max_queue_size} parties)")]
    QueueFull { max_queue_size: u32 },

    #[error("Already waiting in this queue (entry {existing_entry_id})")]
    DuplicateEntry { existing_entry_id: String },

    #[error("Too many recent no-shows ({count}/{limit})")]
    TooManyNoShows { count: u32, limit: u32 },

    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Cannot move entry from {from} to {to}")]
    ForbiddenTransition { from: QueueStatus, to: QueueStatus },

    #[error("Concurrent updates on restaurant {restaurant_id}, gave up after {attempts} attempts")]
    ConcurrencyConflict {
        restaurant_id: String,
        attempts: u32,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl QueueError {
    pub fn validation(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn entry_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "Queue entry",
            id: id.into(),
        }
    }

    pub fn settings_not_found(restaurant_id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "Queue settings",
            id: restaurant_id.into(),
        }
    }

    pub fn notification_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: "Notification",
            id: id.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            QueueError::Validation { code, .. } => *code,
            QueueError::QueueClosed { code, .. } => *code,
            QueueError::QueueFull { .. } => ErrorCode::QueueFull,
            QueueError::DuplicateEntry { .. } => ErrorCode::DuplicateEntry,
            QueueError::TooManyNoShows { .. } => ErrorCode::TooManyNoShows,
            QueueError::NotFound { resource, .. } => match *resource {
                "Queue settings" => ErrorCode::QueueSettingsNotFound,
                "Notification" => ErrorCode::NotificationNotFound,
                _ => ErrorCode::QueueEntryNotFound,
            },
            QueueError::ForbiddenTransition { .. } => ErrorCode::ForbiddenTransition,
            QueueError::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            QueueError::Storage(StoreError::NotFound(_)) => ErrorCode::NotFound,
            QueueError::Storage(StoreError::VersionConflict { .. }) => {
                ErrorCode::ConcurrencyConflict
            }
            QueueError::Storage(_) => ErrorCode::DatabaseError,
        }
    }
}

pub type QueueResult<T> = Result<T, QueueError>;

impl From<QueueError> for AppError {
    fn from(err: QueueError) -> Self {
        let code = err.code();
        match err {
            QueueError::Storage(e) => {
                tracing::error!(error = %e, error_code = %code, "Queue storage error");
                AppError::with_message(code, e.to_string())
            }
            QueueError::ConcurrencyConflict {
                ref restaurant_id,
                attempts,
            } => {
                // 重试耗尽属于运维告警，不是正常负载下的用户错误
                tracing::error!(
                    restaurant_id = %restaurant_id,
                    attempts,
                    "Queue write conflicts exhausted retries"
                );
                AppError::with_message(code, err.to_string())
            }
            QueueError::QueueFull { max_queue_size } => {
                AppError::with_message(code, err.to_string())
                    .with_detail("max_queue_size", max_queue_size)
            }
            QueueError::DuplicateEntry {
                ref existing_entry_id,
            } => {
                let id = existing_entry_id.clone();
                AppError::with_message(code, err.to_string()).with_detail("existing_entry_id", id)
            }
            QueueError::TooManyNoShows { count, limit } => {
                AppError::with_message(code, err.to_string())
                    .with_detail("no_show_count", count)
                    .with_detail("no_show_limit", limit)
            }
            QueueError::ForbiddenTransition { from, to } => {
                AppError::with_message(code, err.to_string())
                    .with_detail("from", from.as_str())
                    .with_detail("to", to.as_str())
            }
            QueueError::NotFound { ref id, .. } => {
                let id = id.clone();
                AppError::with_message(code, err.to_string()).with_detail("id", id)
            }
            other => AppError::with_message(code, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QueueError::QueueFull { max_queue_size: 5 }.code(),
            ErrorCode::QueueFull
        );
        assert_eq!(
            QueueError::settings_not_found("r1").code(),
            ErrorCode::QueueSettingsNotFound
        );
        assert_eq!(
            QueueError::entry_not_found("e1").code(),
            ErrorCode::QueueEntryNotFound
        );
        assert_eq!(
            QueueError::Storage(StoreError::Backend("disk".into())).code(),
            ErrorCode::DatabaseError
        );
    }

    #[test]
    fn test_into_app_error_carries_details() {
        let app: AppError = QueueError::TooManyNoShows { count: 3, limit: 3 }.into();
        assert_eq!(app.code, ErrorCode::TooManyNoShows);
        assert_eq!(app.http_status(), http::StatusCode::FORBIDDEN);
        let details = app.details.unwrap();
        assert_eq!(details["no_show_count"], 3);

        let app: AppError = QueueError::ForbiddenTransition {
            from: QueueStatus::Seated,
            to: QueueStatus::Called,
        }
        .into();
        assert_eq!(app.details.unwrap()["from"], "SEATED");
    }
}
