use market_server::{Config, Server, print_banner, setup_environment};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 加载 .env (可选)
    dotenv::dotenv().ok();

    // 2. 加载配置
    let config = Config::from_env();

    // 3. 设置环境 (工作目录, 日志)
    setup_environment(&config)?;

    print_banner();

    tracing::info!("🛒 Market Server starting...");

    // 4. 启动 HTTP 服务器 (Server::run 会初始化状态并启动后台任务)
    let server = Server::new(config);

    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
