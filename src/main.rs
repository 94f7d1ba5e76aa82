use photo_report_uploader::{config::AppConfig, logging, server, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 先加载配置，日志初始化前的告警会被丢弃
    let config_path = AppConfig::resolve_path();
    let config = AppConfig::load_or_default(&config_path).await;

    // 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    info!("Photo Report Uploader v{} 启动中...", env!("CARGO_PKG_VERSION"));
    info!("配置文件: {}", config_path);
    info!("门户服务: {}", config.portal.base_url);

    let addr = format!("{}:{}", config.server.host, config.server.port);

    // 创建应用状态
    let app_state = AppState::new(config)?;
    info!("应用状态初始化完成");

    let app = server::build_router(app_state.clone());

    // 启动服务器
    info!("服务器启动在: http://{}", addr);
    info!("API 基础路径: http://{}/api/v1", addr);
    info!("健康检查: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // 使用 select! 监听关闭信号
    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("服务器错误: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("收到 Ctrl+C，开始关闭...");
        }
    }

    // 取消进行中的上传并释放预览
    app_state.shutdown();
    info!("应用已安全退出");

    Ok(())
}
