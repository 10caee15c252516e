//! HTTP API
//!
//! - [`queue`] - 排队操作与 SSE
//! - [`notifications`] - 通知投递回调
//! - [`health`] - 健康检查
//!
//! 所有 JSON 响应使用 `ApiResponse` 信封。

pub mod health;
pub mod notifications;
pub mod queue;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::ServerState;

/// Build a router with all routes registered (no middleware, no state)
pub fn build_router() -> Router<ServerState> {
    Router::new()
        .merge(queue::router())
        .merge(notifications::router())
        .merge(health::router())
}

/// Build the application with middleware and state
pub fn build_app(state: &ServerState) -> Router {
    build_router()
        // CORS - Handle cross-origin requests
        .layer(CorsLayer::permissive())
        // Trace - Request tracing
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::core::Config;
    use crate::queue::{MemoryQueueStore, QueueStore};
    use shared::models::RestaurantQueueSettings;

    async fn app() -> Router {
        let store: Arc<dyn QueueStore> = Arc::new(MemoryQueueStore::new());
        store
            .put_settings(&RestaurantQueueSettings::with_defaults("r1"))
            .await
            .unwrap();
        let state = ServerState::with_store(Config::for_tests("/tmp"), store);
        build_app(&state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send_with(app, method, uri, body, None).await
    }

    async fn send_with(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
        user_id: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(uid) = user_id {
            builder = builder.header(queue::extract::USER_ID_HEADER, uid);
        }
        let request = match body {
            Some(json) => builder
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_join_then_status_over_http() {
        let app = app().await;

        let (status, body) = send_with(
            &app,
            "POST",
            "/api/queue/r1/join",
            Some(json!({ "party_size": 2, "user_id": "spoofed" })),
            Some("u-42"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 0);
        let entry = &body["data"]["queue_entry"];
        assert_eq!(entry["position"], 1);
        assert_eq!(entry["user_id"], "u-42");
        assert_eq!(body["data"]["current_queue_size"], 1);

        let id = entry["id"].as_str().unwrap();
        let (status, body) = send(&app, "GET", &format!("/api/queue/entries/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["current_position"], 1);
        assert_eq!(body["data"]["parties_ahead"], 0);
    }

    #[tokio::test]
    async fn test_staff_flow_over_http() {
        let app = app().await;
        let (_, joined) = send_with(
            &app,
            "POST",
            "/api/queue/r1/join",
            Some(json!({ "party_size": 4 })),
            Some("u-1"),
        )
        .await;
        let id = joined["data"]["queue_entry"]["id"].as_str().unwrap().to_string();

        // Empty body defaults to count = 1
        let (status, body) = send(&app, "POST", "/api/queue/r1/call-next", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["called_entries"][0]["id"], id.as_str());
        assert_eq!(body["data"]["remaining_queue_size"], 0);

        let (status, body) = send(
            &app,
            "POST",
            &format!("/api/queue/entries/{id}/seat"),
            Some(json!({ "actual_party_size": 3 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["queue_entry"]["status"], "SEATED");
        assert_eq!(body["data"]["queue_entry"]["party_size"], 3);

        let (_, body) = send(&app, "GET", "/api/queue/r1?status=SEATED", None).await;
        assert_eq!(body["data"]["queue_entries"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["total_waiting"], 0);
    }

    #[tokio::test]
    async fn test_errors_use_envelope() {
        let app = app().await;

        let (status, body) = send(&app, "GET", "/api/queue/entries/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_ne!(body["code"], 0);
        assert!(body["message"].as_str().unwrap().contains("missing"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/queue/r1/join",
            Some(json!({ "party_size": "two" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["code"].as_u64().is_some());

        let (status, _) = send(
            &app,
            "POST",
            "/api/queue/r1/call-next",
            Some(json!({ "count": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/queue/unknown/settings", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_update_over_http() {
        let app = app().await;
        let (status, body) = send(
            &app,
            "PUT",
            "/api/queue/r2/settings",
            Some(json!({ "max_queue_size": 10, "avg_wait_per_party": 8 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["max_queue_size"], 10);

        let (status, body) = send(&app, "GET", "/api/queue/r2/settings", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["avg_wait_per_party"], 8);

        let (status, _) = send(
            &app,
            "PUT",
            "/api/queue/r2/settings",
            Some(json!({ "max_queue_size": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_notification_callback_over_http() {
        let app = app().await;
        let (status, _) = send(
            &app,
            "POST",
            "/api/notifications/nope/status",
            Some(json!({ "status": "delivered" })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            "POST",
            "/api/notifications/nope/status",
            Some(json!({ "status": "bounced" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app().await;
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["restaurants"], 1);
    }
}
