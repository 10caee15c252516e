//! 工具模块
//!
//! - [`AppError`] / [`ApiResponse`] - 统一错误与响应 (from shared::error)
//! - [`logger`] - 日志初始化与审计日志

pub mod logger;

use axum::Json;

pub use shared::error::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

/// Wrap data in the success envelope
pub fn ok<T>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success(data))
}

pub fn ok_with_message<T>(message: impl Into<String>, data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse::success_with_message(message, data))
}
