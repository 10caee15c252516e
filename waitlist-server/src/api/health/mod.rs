//! 健康检查路由
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /health | GET | 健康检查 |
//!
//! ```json
//! {
//!   "status": "healthy",
//!   "version": "0.1.0",
//!   "uptime_seconds": 42,
//!   "store": "ok",
//!   "restaurants": 3,
//!   "subscribers": { "restaurant_topics": 1, "entry_topics": 4 },
//!   "completed_since_start": 17
//! }
//! ```

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::core::ServerState;

pub fn router() -> Router<ServerState> {
    Router::new().route("/health", get(health))
}

/// 健康检查响应
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 状态 (healthy | degraded)
    status: &'static str,
    version: &'static str,
    /// 运行时间 (秒)
    uptime_seconds: u64,
    /// 存储检查 (ok | 错误信息)
    store: String,
    /// 已配置的餐厅数量
    restaurants: usize,
    subscribers: SubscriberCounts,
    /// 启动以来完成的排队记录数
    completed_since_start: u64,
}

/// SSE 订阅主题数量
#[derive(Debug, Serialize)]
pub struct SubscriberCounts {
    restaurant_topics: usize,
    entry_topics: usize,
}

pub async fn health(State(state): State<ServerState>) -> Json<HealthResponse> {
    let (store, restaurants) = match state.manager.store().list_restaurants().await {
        Ok(list) => ("ok".to_string(), list.len()),
        Err(e) => (format!("error: {e}"), 0),
    };
    let (restaurant_topics, entry_topics) = state.broadcaster.topic_counts();
    let completed_since_start = state.stats.iter().map(|s| s.completed).sum();

    Json(HealthResponse {
        status: if store == "ok" { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        store,
        restaurants,
        subscribers: SubscriberCounts {
            restaurant_topics,
            entry_topics,
        },
        completed_since_start,
    })
}
