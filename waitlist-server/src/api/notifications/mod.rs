//! Notification API Module
//!
//! Delivery callbacks from the SMS / email / push transports.
//!
//! | 路径 | 方法 | 说明 |
//! |------|------|------|
//! | /api/notifications/{id}/status | POST | 更新投递状态 |

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use shared::models::QueueNotification;
use shared::queue::UpdateNotificationStatusRequest;

use crate::api::queue::extract::ApiJson;
use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult, ok};

pub fn router() -> Router<ServerState> {
    Router::new().route("/api/notifications/{id}/status", post(update_status))
}

async fn update_status(
    State(state): State<ServerState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<UpdateNotificationStatusRequest>,
) -> AppResult<Json<ApiResponse<QueueNotification>>> {
    let record = state
        .manager
        .update_notification_status(&id, payload.status, payload.failure_reason)
        .await?;
    Ok(ok(record))
}
