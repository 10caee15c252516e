//! Queue API Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
};
use shared::models::{
    QueueAnalytics, QueueEntry, QueueNotification, QueueSettingsUpdate, RestaurantQueueSettings,
};
use shared::queue::{
    AnalyticsQuery, CallNextRequest, CallNextResponse, JoinQueueRequest, JoinQueueResponse,
    LeaveQueueRequest, LeaveQueueResponse, MarkNoShowResponse, MarkSeatedRequest,
    MarkSeatedResponse, QueueStatusResponse, RestaurantQueueQuery, RestaurantQueueResponse,
};

use super::extract::{ApiJson, CallerId, OptionalJson};
use crate::core::ServerState;
use crate::utils::{ApiResponse, AppResult, ok};

// ========== Customer ==========

/// Join a restaurant's queue. `X-User-Id` takes precedence over a body `user_id`.
pub async fn join(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
    CallerId(caller): CallerId,
    ApiJson(mut payload): ApiJson<JoinQueueRequest>,
) -> AppResult<Json<ApiResponse<JoinQueueResponse>>> {
    if caller.is_some() {
        payload.user_id = caller;
    }
    let response = state.manager.join_queue(&restaurant_id, payload).await?;
    Ok(ok(response))
}

pub async fn get_status(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
) -> AppResult<Json<ApiResponse<QueueStatusResponse>>> {
    Ok(ok(state.manager.get_queue_status(&entry_id).await?))
}

pub async fn leave(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
    CallerId(caller): CallerId,
    OptionalJson(payload): OptionalJson<LeaveQueueRequest>,
) -> AppResult<Json<ApiResponse<LeaveQueueResponse>>> {
    tracing::debug!(entry_id = %entry_id, caller = ?caller, "Leave queue requested");
    let response = state.manager.leave_queue(&entry_id, payload.reason).await?;
    Ok(ok(response))
}

pub async fn list_notifications(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
) -> AppResult<Json<ApiResponse<Vec<QueueNotification>>>> {
    Ok(ok(state.manager.list_notifications(&entry_id).await?))
}

// ========== Staff ==========

pub async fn get_restaurant_queue(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
    Query(query): Query<RestaurantQueueQuery>,
) -> AppResult<Json<ApiResponse<RestaurantQueueResponse>>> {
    let response = state
        .manager
        .get_restaurant_queue(&restaurant_id, query.status.as_deref())
        .await?;
    Ok(ok(response))
}

pub async fn call_next(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
    OptionalJson(payload): OptionalJson<CallNextRequest>,
) -> AppResult<Json<ApiResponse<CallNextResponse>>> {
    let response = state
        .manager
        .call_next(&restaurant_id, payload.count)
        .await?;
    Ok(ok(response))
}

pub async fn call_entry(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
) -> AppResult<Json<ApiResponse<QueueEntry>>> {
    Ok(ok(state.manager.call_entry(&entry_id).await?))
}

pub async fn mark_seated(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
    OptionalJson(payload): OptionalJson<MarkSeatedRequest>,
) -> AppResult<Json<ApiResponse<MarkSeatedResponse>>> {
    let response = state
        .manager
        .mark_seated(&entry_id, payload.actual_party_size)
        .await?;
    Ok(ok(response))
}

pub async fn mark_no_show(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
) -> AppResult<Json<ApiResponse<MarkNoShowResponse>>> {
    Ok(ok(state.manager.mark_no_show(&entry_id).await?))
}

// ========== Settings & analytics ==========

pub async fn get_settings(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
) -> AppResult<Json<ApiResponse<RestaurantQueueSettings>>> {
    Ok(ok(state.manager.get_settings(&restaurant_id).await?))
}

pub async fn update_settings(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
    ApiJson(update): ApiJson<QueueSettingsUpdate>,
) -> AppResult<Json<ApiResponse<RestaurantQueueSettings>>> {
    let settings = state
        .manager
        .update_queue_settings(&restaurant_id, update)
        .await?;
    Ok(ok(settings))
}

pub async fn get_analytics(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
    Query(query): Query<AnalyticsQuery>,
) -> AppResult<Json<ApiResponse<QueueAnalytics>>> {
    let analytics = state
        .manager
        .get_analytics(&restaurant_id, query.from, query.to)
        .await?;
    Ok(ok(analytics))
}
