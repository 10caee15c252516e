//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::QueueEntryNotFound
            | Self::QueueSettingsNotFound
            | Self::NotificationNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists
            | Self::DuplicateEntry
            | Self::QueueFull
            | Self::ForbiddenTransition => StatusCode::CONFLICT,

            // 403 Forbidden
            Self::TooManyNoShows => StatusCode::FORBIDDEN,

            // 422 Unprocessable (venue closed)
            Self::QueueDisabled | Self::OutsideWorkingHours => StatusCode::UNPROCESSABLE_ENTITY,

            // 503 Service Unavailable (transient errors, client can retry)
            Self::TimeoutError | Self::ConcurrencyConflict => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            Self::Unknown
            | Self::InternalError
            | Self::DatabaseError
            | Self::ConfigError
            | Self::NotificationDeliveryFailed => StatusCode::INTERNAL_SERVER_ERROR,

            // 400 Bad Request (default for validation errors)
            _ => StatusCode::BAD_REQUEST,
        }
    }
}
