use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which queue store backs the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// In-memory fixture (demo / tests)
    Memory,
    /// Embedded redb file under `work_dir`
    Redb,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "redb" => Ok(StoreKind::Redb),
            other => Err(format!("unknown QUEUE_STORE '{other}' (expected memory|redb)")),
        }
    }
}

/// 服务器配置 - 排队引擎的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (存储文件、日志) |
/// | HTTP_PORT | 3000 | HTTP / SSE 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 默认日志级别 |
/// | LOG_JSON | false (生产环境 true) | JSON 日志输出 |
/// | QUEUE_STORE | memory | memory 或 redb |
/// | SCHEDULER_TICK_SECS | 15 | 自动叫号调度精度 |
/// | SWEEP_INTERVAL_SECS | 60 | 过期 / 提醒扫描间隔 |
/// | ESTIMATE_REFRESH_SECS | 300 | 全队列预估刷新间隔 |
/// | REMINDER_AFTER_MINUTES | 5 | 叫号后提醒窗口 |
/// | NO_SHOW_WINDOW_DAYS | 30 | 爽约统计窗口 |
/// | HISTORY_LOOKBACK_HOURS | 336 | 预估历史窗口 |
/// | ESTIMATOR_MIN_SAMPLES | 5 | 分桶最小样本数 |
/// | ESTIMATOR_ALPHA | 0.3 | EWMA 平滑系数 |
/// | AUTO_CALL_BATCH | 1 | 每次自动叫号数量 |
/// | BROADCAST_CAPACITY | 256 | 每个订阅主题缓冲 |
/// | NOTIFICATION_BUFFER | 1024 | 通知派发队列长度 |
/// | ANALYTICS_BUFFER | 1024 | 统计队列长度 |
/// | SSE_KEEPALIVE_SECS | 15 | SSE 心跳间隔 |
/// | SSE_RETRY_MS | 3000 | 客户端重连间隔 |
/// | POLL_INTERVAL_SECS | 10 | 轮询降级间隔 |
/// | MAX_CONFLICT_RETRIES | 3 | 版本冲突重试次数 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/waitlist QUEUE_STORE=redb HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库、日志等文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_json: bool,
    pub store: StoreKind,

    // === 后台任务 ===
    pub scheduler_tick_secs: u64,
    pub sweep_interval_secs: u64,
    pub estimate_refresh_secs: u64,
    pub reminder_after_minutes: u32,
    pub no_show_window_days: u32,

    // === 等待时间预估 ===
    pub history_lookback_hours: u32,
    pub estimator_min_samples: usize,
    pub estimator_alpha: f64,

    pub auto_call_batch: u32,

    // === 通道容量 ===
    pub broadcast_capacity: usize,
    pub notification_buffer: usize,
    pub analytics_buffer: usize,

    // === SSE ===
    pub sse_keepalive_secs: u64,
    pub sse_retry_ms: u64,
    pub poll_interval_secs: u64,

    pub max_conflict_retries: u32,
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());
        let production = environment == "production";
        let store = std::env::var("QUEUE_STORE")
            .ok()
            .and_then(|v| match v.parse::<StoreKind>() {
                Ok(kind) => Some(kind),
                Err(e) => {
                    tracing::warn!("{}, falling back to memory store", e);
                    None
                }
            })
            .unwrap_or(StoreKind::Memory);

        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            http_port: env_parse("HTTP_PORT", 3000),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON", production),
            environment,
            store,
            scheduler_tick_secs: env_parse("SCHEDULER_TICK_SECS", 15),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60),
            estimate_refresh_secs: env_parse("ESTIMATE_REFRESH_SECS", 300),
            reminder_after_minutes: env_parse("REMINDER_AFTER_MINUTES", 5),
            no_show_window_days: env_parse("NO_SHOW_WINDOW_DAYS", 30),
            history_lookback_hours: env_parse("HISTORY_LOOKBACK_HOURS", 336),
            estimator_min_samples: env_parse("ESTIMATOR_MIN_SAMPLES", 5),
            estimator_alpha: env_parse("ESTIMATOR_ALPHA", 0.3),
            auto_call_batch: env_parse("AUTO_CALL_BATCH", 1),
            broadcast_capacity: env_parse("BROADCAST_CAPACITY", 256),
            notification_buffer: env_parse("NOTIFICATION_BUFFER", 1024),
            analytics_buffer: env_parse("ANALYTICS_BUFFER", 1024),
            sse_keepalive_secs: env_parse("SSE_KEEPALIVE_SECS", 15),
            sse_retry_ms: env_parse("SSE_RETRY_MS", 3000),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS", 10),
            max_conflict_retries: env_parse("MAX_CONFLICT_RETRIES", 3),
        }
        .sanitized()
    }

    /// Defaults for tests: memory store, fixed values, no environment lookup
    pub fn for_tests(work_dir: impl Into<String>) -> Self {
        Self {
            work_dir: work_dir.into(),
            http_port: 0,
            environment: "test".into(),
            log_level: "debug".into(),
            log_json: false,
            store: StoreKind::Memory,
            scheduler_tick_secs: 15,
            sweep_interval_secs: 60,
            estimate_refresh_secs: 300,
            reminder_after_minutes: 5,
            no_show_window_days: 30,
            history_lookback_hours: 336,
            estimator_min_samples: 5,
            estimator_alpha: 0.3,
            auto_call_batch: 1,
            broadcast_capacity: 256,
            notification_buffer: 1024,
            analytics_buffer: 1024,
            sse_keepalive_secs: 15,
            sse_retry_ms: 3000,
            poll_interval_secs: 10,
            max_conflict_retries: 3,
        }
    }

    /// Clamp values that would make timers spin or channels panic
    fn sanitized(mut self) -> Self {
        self.scheduler_tick_secs = self.scheduler_tick_secs.max(1);
        self.sweep_interval_secs = self.sweep_interval_secs.max(1);
        self.estimate_refresh_secs = self.estimate_refresh_secs.max(1);
        self.estimator_min_samples = self.estimator_min_samples.max(1);
        if !(self.estimator_alpha > 0.0 && self.estimator_alpha <= 1.0) {
            self.estimator_alpha = 0.3;
        }
        self.auto_call_batch = self.auto_call_batch.max(1);
        self.broadcast_capacity = self.broadcast_capacity.max(1);
        self.notification_buffer = self.notification_buffer.max(1);
        self.analytics_buffer = self.analytics_buffer.max(1);
        self.sse_keepalive_secs = self.sse_keepalive_secs.max(1);
        self
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("queue.redb")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn estimate_refresh(&self) -> Duration {
        Duration::from_secs(self.estimate_refresh_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_kind_parse() {
        assert_eq!("memory".parse::<StoreKind>().unwrap(), StoreKind::Memory);
        assert_eq!(" REDB ".parse::<StoreKind>().unwrap(), StoreKind::Redb);
        assert!("postgres".parse::<StoreKind>().is_err());
    }

    #[test]
    fn test_sanitized_clamps_zero_values() {
        let mut config = Config::for_tests("/tmp");
        config.scheduler_tick_secs = 0;
        config.estimator_alpha = 1.5;
        config.broadcast_capacity = 0;
        let config = config.sanitized();
        assert_eq!(config.scheduler_tick_secs, 1);
        assert_eq!(config.estimator_alpha, 0.3);
        assert_eq!(config.broadcast_capacity, 1);
    }
}
