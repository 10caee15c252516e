//! Data models
//!
//! Shared between waitlist-server and clients (via API).
//! IDs are UUID v4 strings; timestamps are Unix milliseconds.

pub mod analytics;
pub mod queue_entry;
pub mod queue_history;
pub mod queue_notification;
pub mod queue_settings;

// Re-exports
pub use analytics::*;
pub use queue_entry::*;
pub use queue_history::*;
pub use queue_notification::*;
pub use queue_settings::*;
