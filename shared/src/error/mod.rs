//! Unified error system for the waitlist engine
//!
//! - [`ErrorCode`]: stable numeric codes shared with clients
//! - [`ErrorCategory`]: classification by code range
//! - [`AppError`]: code + message + optional structured details
//! - [`ApiResponse`]: JSON envelope for every HTTP response
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Queue errors
//! - 5xxx: Notification errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use shared::error::{AppError, ErrorCode, ApiResponse};
//!
//! let err = AppError::with_message(ErrorCode::QueueFull, "Queue is full (max 50)")
//!     .with_detail("max_queue_size", 50);
//!
//! let response = ApiResponse::<()>::error(&err);
//! assert_eq!(response.code, Some(4003));
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{ApiResponse, AppError, AppResult};
