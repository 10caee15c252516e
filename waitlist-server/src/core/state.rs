use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::{BackgroundTasks, Config, Result, ServerError, StoreKind, TaskKind};
use crate::queue::{
    AnalyticsAggregator, AutoCallScheduler, EstimatorConfig, EventChannels, LogTransport,
    MemoryQueueStore, NotificationDispatcher, PositionAllocator, QueueBroadcaster,
    QueueEventRouter, QueueManager, QueueStore, QueueSweeper, RedbQueueStore, RollingStats,
    WaitTimeEstimator,
};

/// 服务器状态 - 持有排队引擎各组件的共享引用
///
/// 使用 Arc 实现浅拷贝，可直接作为 axum 的 `State`。
///
/// # 服务组件
///
/// | 字段 | 类型 | 说明 |
/// |------|------|------|
/// | config | Config | 配置项 (不可变) |
/// | manager | Arc<QueueManager> | 排队操作入口 |
/// | broadcaster | Arc<QueueBroadcaster> | SSE 订阅主题 |
/// | stats | RollingStats | 统计工作者维护的滚动计数 |
///
/// 工作者通道在 [`ServerState::start_background_tasks`] 中被取走，只能启动一次。
#[derive(Clone)]
pub struct ServerState {
    /// 服务器配置
    pub config: Config,
    pub manager: Arc<QueueManager>,
    pub broadcaster: Arc<QueueBroadcaster>,
    pub stats: RollingStats,
    started_at: Instant,
    channels: Arc<Mutex<Option<EventChannels>>>,
}

impl ServerState {
    /// 初始化服务器状态
    ///
    /// 1. 创建工作目录
    /// 2. 按 `QUEUE_STORE` 打开存储
    /// 3. 组装预估器、事件路由、分配器和管理器
    pub async fn initialize(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.work_dir).map_err(ServerError::WorkDir)?;

        let store: Arc<dyn QueueStore> = match config.store {
            StoreKind::Memory => {
                tracing::warn!("Using in-memory queue store, data is lost on restart");
                Arc::new(MemoryQueueStore::new())
            }
            StoreKind::Redb => {
                let path = config.store_path();
                tracing::info!(path = %path.display(), "Opening redb queue store");
                Arc::new(RedbQueueStore::open(&path)?)
            }
        };

        Ok(Self::with_store(config.clone(), store))
    }

    /// 使用现有存储组装状态 (测试 / 嵌入)
    pub fn with_store(config: Config, store: Arc<dyn QueueStore>) -> Self {
        let estimator = Arc::new(WaitTimeEstimator::new(EstimatorConfig {
            alpha: config.estimator_alpha,
            min_samples: config.estimator_min_samples,
            lookback_hours: config.history_lookback_hours,
            ttl: config.estimate_refresh(),
        }));
        let broadcaster = Arc::new(QueueBroadcaster::new(config.broadcast_capacity));
        let (router, channels) = QueueEventRouter::new(
            broadcaster.clone(),
            config.notification_buffer,
            config.analytics_buffer,
        );
        let allocator = PositionAllocator::new(
            store,
            estimator,
            Arc::new(router),
            config.max_conflict_retries,
            config.no_show_window_days,
        );
        let manager = Arc::new(QueueManager::new(allocator, config.reminder_after_minutes));

        Self {
            config,
            manager,
            broadcaster,
            stats: RollingStats::default(),
            started_at: Instant::now(),
            channels: Arc::new(Mutex::new(Some(channels))),
        }
    }

    /// 启动后台任务
    ///
    /// - 通知派发 (Worker)
    /// - 统计聚合 (Worker)
    /// - 自动叫号 (Periodic)
    /// - 过期 / 提醒扫描 (Periodic)
    pub fn start_background_tasks(&self) -> Result<BackgroundTasks> {
        let EventChannels {
            notification_rx,
            analytics_rx,
        } = self
            .channels
            .lock()
            .take()
            .ok_or(ServerError::TasksAlreadyStarted)?;

        let mut tasks = BackgroundTasks::new();
        let token = tasks.shutdown_token();

        let dispatcher =
            NotificationDispatcher::new(self.manager.store().clone(), Arc::new(LogTransport));
        tasks.spawn(
            "notification_dispatcher",
            TaskKind::Worker,
            dispatcher.run(notification_rx, token.clone()),
        );

        let aggregator = AnalyticsAggregator::new(
            self.manager.allocator().estimator().clone(),
            self.stats.clone(),
        );
        tasks.spawn(
            "analytics_aggregator",
            TaskKind::Worker,
            aggregator.run(analytics_rx, token.clone()),
        );

        let scheduler = AutoCallScheduler::new(
            self.manager.clone(),
            token.clone(),
            Duration::from_secs(self.config.scheduler_tick_secs),
            self.config.auto_call_batch,
        );
        tasks.spawn("auto_call_scheduler", TaskKind::Periodic, scheduler.run());

        let sweeper = QueueSweeper::new(
            self.manager.clone(),
            token,
            Duration::from_secs(self.config.sweep_interval_secs),
            self.config.estimate_refresh(),
        );
        tasks.spawn("queue_sweeper", TaskKind::Periodic, sweeper.run());

        tasks.log_summary();
        Ok(tasks)
    }

    /// 运行时间 (秒)
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initialize_redb_store_in_work_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(dir.path().to_string_lossy());
        config.store = StoreKind::Redb;

        let state = ServerState::initialize(&config).await.unwrap();
        assert!(config.store_path().exists());
        assert!(state.manager.store().list_restaurants().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_background_tasks_start_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServerState::initialize(&Config::for_tests(dir.path().to_string_lossy()))
            .await
            .unwrap();

        let tasks = state.start_background_tasks().unwrap();
        assert_eq!(tasks.len(), 4);
        assert!(matches!(
            state.start_background_tasks(),
            Err(ServerError::TasksAlreadyStarted)
        ));

        tasks.shutdown(Duration::from_secs(2)).await;
    }
}
