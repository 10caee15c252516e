//! Waitlist Server - 餐厅排队位置与通知引擎
//!
//! # 架构概述
//!
//! - **排队引擎** (`queue`): 位置分配、状态机、等待预估、通知决策
//! - **后台任务** (`core::tasks`): 通知派发、统计聚合、自动叫号、过期扫描
//! - **HTTP API** (`api`): REST 接口与 SSE 实时推送
//!
//! # 模块结构
//!
//! ```text
//! waitlist-server/src/
//! ├── core/          # 配置、状态、服务器、后台任务
//! ├── queue/         # 排队引擎与存储
//! ├── api/           # HTTP 路由和处理器
//! └── utils/         # 日志、错误类型
//! ```

pub mod api;
pub mod core;
pub mod queue;
pub mod utils;

// Re-export 公共类型
pub use core::{Config, Server, ServerState};
pub use queue::{QueueManager, QueueStore};
pub use utils::{ApiResponse, AppError, AppResult, ErrorCategory, ErrorCode};

// Re-export logger functions
pub use utils::logger::{cleanup_old_logs, init_logger, init_logger_with_file};

/// 设置运行环境
///
/// 1. 加载 `.env`
/// 2. 创建工作目录
/// 3. 初始化日志 (控制台 + `<work_dir>/logs` 滚动文件)
pub fn setup_environment() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    std::fs::create_dir_all(&config.work_dir)?;
    init_logger_with_file(&config.log_level, config.log_json, Some(config.log_dir().as_path()))?;
    Ok(())
}

pub fn print_banner() {
    println!(
        r#"
 _       __      _ __  ___      __
| |     / /___ _(_) /_/ (_)____/ /_
| | /| / / __ `/ / __/ / / ___/ __/
| |/ |/ / /_/ / / /_/ / (__  ) /_
|__/|__/\__,_/_/\__/_/_/____/\__/
    "#
    );
}
