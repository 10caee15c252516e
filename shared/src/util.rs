//! Small helpers shared by server and clients

/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Milliseconds in one minute
pub const MINUTE_MILLIS: i64 = 60_000;

/// Whole minutes elapsed between two Unix-millis timestamps (floored, never negative)
pub fn minutes_between(from: i64, to: i64) -> i64 {
    ((to - from) / MINUTE_MILLIS).max(0)
}

/// Generate a new resource id
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
