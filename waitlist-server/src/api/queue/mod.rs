//! Queue API Module
//!
//! # 路由列表
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/queue/{restaurant_id}/join | POST | 加入排队 |
//! | /api/queue/{restaurant_id} | GET | 餐厅排队列表 (`?status=`) |
//! | /api/queue/{restaurant_id}/call-next | POST | 按顺序叫号 |
//! | /api/queue/{restaurant_id}/settings | GET / PUT | 排队设置 |
//! | /api/queue/{restaurant_id}/analytics | GET | 排队统计 (`?from=&to=`) |
//! | /api/queue/{restaurant_id}/events | GET | 餐厅 SSE |
//! | /api/queue/entries/{id} | GET | 排队状态 |
//! | /api/queue/entries/{id}/leave | POST | 取消排队 |
//! | /api/queue/entries/{id}/call | POST | 指定叫号 |
//! | /api/queue/entries/{id}/seat | POST | 入座 |
//! | /api/queue/entries/{id}/no-show | POST | 爽约 |
//! | /api/queue/entries/{id}/notifications | GET | 通知记录 |
//! | /api/queue/entries/{id}/events | GET | 个人 SSE |

pub mod extract;
mod handler;
mod sse;

use axum::{
    Router,
    routing::{get, post},
};

use crate::core::ServerState;

/// Queue router
pub fn router() -> Router<ServerState> {
    Router::new().nest("/api/queue", routes())
}

fn routes() -> Router<ServerState> {
    Router::new()
        // Entry routes first: `entries` is not a restaurant id
        .route("/entries/{id}", get(handler::get_status))
        .route("/entries/{id}/leave", post(handler::leave))
        .route("/entries/{id}/call", post(handler::call_entry))
        .route("/entries/{id}/seat", post(handler::mark_seated))
        .route("/entries/{id}/no-show", post(handler::mark_no_show))
        .route("/entries/{id}/notifications", get(handler::list_notifications))
        .route("/entries/{id}/events", get(sse::entry_events))
        // Restaurant routes
        .route("/{restaurant_id}", get(handler::get_restaurant_queue))
        .route("/{restaurant_id}/join", post(handler::join))
        .route("/{restaurant_id}/call-next", post(handler::call_next))
        .route(
            "/{restaurant_id}/settings",
            get(handler::get_settings).put(handler::update_settings),
        )
        .route("/{restaurant_id}/analytics", get(handler::get_analytics))
        .route("/{restaurant_id}/events", get(sse::restaurant_events))
}
