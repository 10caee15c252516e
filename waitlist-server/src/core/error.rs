use thiserror::Error;

use crate::queue::store::StoreError;

/// 启动与运行期错误 (请求级错误走 `AppError`)
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("工作目录不可用: {0}")]
    WorkDir(#[source] std::io::Error),

    #[error("存储初始化失败: {0}")]
    Store(#[from] StoreError),

    #[error("端口绑定失败 {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("后台任务已启动")]
    TasksAlreadyStarted,

    #[error("内部服务器错误: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
