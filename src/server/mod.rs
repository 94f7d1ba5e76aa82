// Web服务器模块

pub mod handlers;
pub mod state;

pub use state::AppState;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

/// 健康检查响应结构
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    sessions: usize,
}

/// 构建完整应用路由
pub fn build_router(app_state: AppState) -> Router {
    let api_routes = Router::new()
        // 会话API
        .route("/sessions", post(handlers::open_session))
        .route(
            "/sessions/:task",
            get(handlers::get_session).delete(handlers::close_session),
        )
        .route("/sessions/:task/submit", post(handlers::submit_report))
        .route(
            "/sessions/:task/notices/:concern/dismiss",
            post(handlers::dismiss_notice),
        )
        // 单元与文件夹API
        .route("/sessions/:task/units/:unit/open", post(handlers::open_unit))
        .route("/sessions/:task/units/:unit/tree", get(handlers::get_unit_tree))
        .route(
            "/sessions/:task/units/:unit/select",
            post(handlers::select_folder),
        )
        .route(
            "/sessions/:task/units/:unit/toggle",
            post(handlers::toggle_folder),
        )
        .route(
            "/sessions/:task/units/:unit/files",
            get(handlers::list_stored_files).delete(handlers::delete_stored_file),
        )
        // 上传队列API
        .route("/sessions/:task/items", post(handlers::add_items))
        .route(
            "/sessions/:task/items/:id",
            axum::routing::delete(handlers::remove_item),
        )
        .route(
            "/sessions/:task/items/:id/requeue",
            post(handlers::requeue_item),
        )
        .route(
            "/sessions/:task/items/:id/preview",
            get(handlers::get_preview),
        )
        // 上传运行API
        .route("/sessions/:task/upload", post(handlers::start_upload))
        .route("/sessions/:task/upload/cancel", post(handlers::cancel_upload))
        .with_state(app_state.clone());

    let health_state = app_state.clone();
    let health_check = move || {
        let sessions = health_state.sessions.len();
        async move {
            Json(HealthResponse {
                status: "ok".to_string(),
                service: "photo-report-uploader".to_string(),
                sessions,
            })
        }
    };

    // 配置中间件层
    let middleware = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http()) // HTTP 请求日志
        .layer(cors_layer(&app_state.config.server.cors_origins));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/health", get(health_check))
        .layer(middleware)
}

/// 未配置来源时允许任意来源
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("忽略无效的 CORS 来源: {}", origin);
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(allowed)
    }
}
