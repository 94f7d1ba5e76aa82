// 会话API处理器

use crate::server::handlers::{reply, ApiResponse};
use crate::server::AppState;
use crate::session::{Concern, SessionError, SessionSnapshot};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

/// 打开会话请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionRequest {
    pub task_id: String,
    pub unit_ids: Vec<String>,
}

/// POST /api/v1/sessions
/// 打开报告会话（加载文件夹结构）
pub async fn open_session(
    State(app_state): State<AppState>,
    Json(req): Json<OpenSessionRequest>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, StatusCode> {
    info!(
        "API: 打开会话 task={}, 单元数={}",
        req.task_id,
        req.unit_ids.len()
    );

    if req.task_id.trim().is_empty() {
        return Ok(Json(ApiResponse::error(400, "taskId 不能为空".to_string())));
    }
    if req.unit_ids.iter().all(|id| id.trim().is_empty()) {
        return Ok(Json(ApiResponse::error(400, "unitIds 不能为空".to_string())));
    }

    let session = app_state.open_session(&req.task_id, req.unit_ids).await;
    Ok(Json(ApiResponse::success(session.snapshot())))
}

/// GET /api/v1/sessions/:task
/// 获取会话快照
pub async fn get_session(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<SessionSnapshot>>, StatusCode> {
    Ok(reply(app_state.session(&task_id).map(|s| s.snapshot())))
}

/// DELETE /api/v1/sessions/:task
/// 关闭会话（取消上传并释放预览）
pub async fn close_session(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    let result = if app_state.close_session(&task_id) {
        info!("会话已关闭: {}", task_id);
        Ok("Session closed".to_string())
    } else {
        Err(SessionError::UnknownSession(task_id))
    };
    Ok(reply(result))
}

/// POST /api/v1/sessions/:task/submit
/// 提交报告
pub async fn submit_report(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    info!("API: 提交报告 task={}", task_id);
    let result = match app_state.session(&task_id) {
        Ok(session) => session
            .submit_report()
            .await
            .map(|_| "Report submitted".to_string()),
        Err(e) => Err(e),
    };
    Ok(reply(result))
}

/// POST /api/v1/sessions/:task/notices/:concern/dismiss
/// 关闭提示
pub async fn dismiss_notice(
    State(app_state): State<AppState>,
    Path((task_id, concern)): Path<(String, String)>,
) -> Result<Json<ApiResponse<bool>>, StatusCode> {
    let concern: Concern = match concern.parse() {
        Ok(c) => c,
        Err(message) => return Ok(Json(ApiResponse::error(400, message))),
    };
    Ok(reply(
        app_state
            .session(&task_id)
            .map(|s| s.dismiss_notice(concern)),
    ))
}
