//! Shared types for the waitlist engine
//!
//! Domain models, wire events, request/response shapes and the unified
//! error system used by `waitlist-server` and any client that talks to it.

pub mod error;
pub mod models;
pub mod queue;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};

pub use error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};
pub use models::{
    QueueEntry, QueueHistory, QueueNotification, QueueStatus, RestaurantQueueSettings,
};
pub use queue::{QueueEventType, QueueSseEvent};
