use waitlist_server::{Config, Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 设置环境 (dotenv, 工作目录, 日志)
    setup_environment()?;

    print_banner();

    tracing::info!("🍽️ Waitlist server starting...");

    // 2. 加载配置
    let config = Config::from_env();
    tracing::info!(
        environment = %config.environment,
        store = ?config.store,
        port = config.http_port,
        "Configuration loaded"
    );

    // 3. 初始化服务器状态
    let state = ServerState::initialize(&config).await?;

    // 4. 启动 HTTP 服务器 (后台任务随服务器启动与关闭)
    let server = Server::with_state(config, state);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
