//! Queue wire types
//!
//! - [`event`]: realtime events pushed to live subscribers (SSE)
//! - [`request`] / [`response`]: payloads of the public queue operations

pub mod event;
pub mod request;
pub mod response;

pub use event::{QueueEventType, QueueSseEvent};
pub use request::*;
pub use response::*;
