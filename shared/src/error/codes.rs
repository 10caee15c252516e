//! Error codes for the waitlist engine
//!
//! Codes are organised by range:
//! - 0xxx: General errors
//! - 4xxx: Queue errors
//! - 5xxx: Notification errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// Serialized as a bare `u16` so TypeScript clients can switch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Required field missing
    RequiredField = 7,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 4xxx: Queue ====================
    /// Queue entry not found
    QueueEntryNotFound = 4001,
    /// No queue settings exist for the restaurant
    QueueSettingsNotFound = 4002,
    /// Queue reached max_queue_size
    QueueFull = 4003,
    /// The caller already holds an active entry at this venue
    DuplicateEntry = 4004,
    /// The caller has too many recent no-shows
    TooManyNoShows = 4005,
    /// Illegal state machine transition
    ForbiddenTransition = 4006,
    /// Queue is disabled for the venue
    QueueDisabled = 4007,
    /// Venue is outside its working hours
    OutsideWorkingHours = 4008,
    /// Party size outside [1, max_party_size]
    PartySizeOutOfRange = 4009,
    /// No identity channel supplied (user, phone, email or name)
    IdentityRequired = 4010,

    // ==================== 5xxx: Notification ====================
    /// Notification record not found
    NotificationNotFound = 5001,
    /// Notification delivery failed
    NotificationDeliveryFailed = 5002,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Storage error
    DatabaseError = 9002,
    /// Operation timeout
    TimeoutError = 9004,
    /// Configuration error
    ConfigError = 9005,
    /// Concurrent writers kept conflicting, retries exhausted
    ConcurrencyConflict = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::Unknown => "An unknown error occurred",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::AlreadyExists => "Resource already exists",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::RequiredField => "Required field is missing",
            ErrorCode::ValueOutOfRange => "Value is out of range",

            // Queue
            ErrorCode::QueueEntryNotFound => "Queue entry not found",
            ErrorCode::QueueSettingsNotFound => "Queue is not configured for this restaurant",
            ErrorCode::QueueFull => "Queue is full",
            ErrorCode::DuplicateEntry => "An active queue entry already exists for this guest",
            ErrorCode::TooManyNoShows => "Too many recent no-shows",
            ErrorCode::ForbiddenTransition => "Queue entry cannot move to the requested status",
            ErrorCode::QueueDisabled => "Queue is disabled for this restaurant",
            ErrorCode::OutsideWorkingHours => "Restaurant is outside its working hours",
            ErrorCode::PartySizeOutOfRange => "Party size is out of range",
            ErrorCode::IdentityRequired => "A user, phone number, email or name is required",

            // Notification
            ErrorCode::NotificationNotFound => "Notification not found",
            ErrorCode::NotificationDeliveryFailed => "Notification delivery failed",

            // System
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Storage error",
            ErrorCode::TimeoutError => "Operation timed out",
            ErrorCode::ConfigError => "Configuration error",
            ErrorCode::ConcurrencyConflict => "System busy, please retry",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            1 => Ok(ErrorCode::Unknown),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            4 => Ok(ErrorCode::AlreadyExists),
            5 => Ok(ErrorCode::InvalidRequest),
            7 => Ok(ErrorCode::RequiredField),
            8 => Ok(ErrorCode::ValueOutOfRange),

            // Queue
            4001 => Ok(ErrorCode::QueueEntryNotFound),
            4002 => Ok(ErrorCode::QueueSettingsNotFound),
            4003 => Ok(ErrorCode::QueueFull),
            4004 => Ok(ErrorCode::DuplicateEntry),
            4005 => Ok(ErrorCode::TooManyNoShows),
            4006 => Ok(ErrorCode::ForbiddenTransition),
            4007 => Ok(ErrorCode::QueueDisabled),
            4008 => Ok(ErrorCode::OutsideWorkingHours),
            4009 => Ok(ErrorCode::PartySizeOutOfRange),
            4010 => Ok(ErrorCode::IdentityRequired),

            // Notification
            5001 => Ok(ErrorCode::NotificationNotFound),
            5002 => Ok(ErrorCode::NotificationDeliveryFailed),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9004 => Ok(ErrorCode::TimeoutError),
            9005 => Ok(ErrorCode::ConfigError),
            9404 => Ok(ErrorCode::ConcurrencyConflict),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip_through_u16() {
        for code in [
            ErrorCode::Success,
            ErrorCode::QueueFull,
            ErrorCode::TooManyNoShows,
            ErrorCode::NotificationDeliveryFailed,
            ErrorCode::ConcurrencyConflict,
        ] {
            assert_eq!(ErrorCode::try_from(code.code()), Ok(code));
        }
    }

    #[test]
    fn test_invalid_code() {
        assert_eq!(ErrorCode::try_from(4999), Err(InvalidErrorCode(4999)));
    }

    #[test]
    fn test_serialize_as_number() {
        let json = serde_json::to_string(&ErrorCode::DuplicateEntry).unwrap();
        assert_eq!(json, "4004");
        let code: ErrorCode = serde_json::from_str("4005").unwrap();
        assert_eq!(code, ErrorCode::TooManyNoShows);
    }
}
