// 上传项API处理器

use crate::server::handlers::{reply, ApiResponse};
use crate::server::AppState;
use crate::session::{AddFilesReport, SessionError};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// 添加本地文件请求
#[derive(Debug, Deserialize)]
pub struct AddItemsRequest {
    pub paths: Vec<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct RequeueResponse {
    pub id: String,
}

/// POST /api/v1/sessions/:task/items
/// 添加本地文件到上传队列
pub async fn add_items(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
    Json(req): Json<AddItemsRequest>,
) -> Result<Json<ApiResponse<AddFilesReport>>, StatusCode> {
    info!("API: 添加文件 task={}, 数量={}", task_id, req.paths.len());
    let result = match app_state.session(&task_id) {
        Ok(session) => Ok(session.add_files(req.paths).await),
        Err(e) => Err(e),
    };
    Ok(reply(result))
}

/// DELETE /api/v1/sessions/:task/items/:id
/// 移除上传项
pub async fn remove_item(
    State(app_state): State<AppState>,
    Path((task_id, item_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<String>>, StatusCode> {
    Ok(reply(app_state.session(&task_id).and_then(|s| {
        s.remove_item(&item_id)?;
        Ok("Item removed".to_string())
    })))
}

/// POST /api/v1/sessions/:task/items/:id/requeue
/// 重新排队失败 / 已取消的上传项
pub async fn requeue_item(
    State(app_state): State<AppState>,
    Path((task_id, item_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<RequeueResponse>>, StatusCode> {
    Ok(reply(
        app_state
            .session(&task_id)
            .and_then(|s| s.requeue_item(&item_id))
            .map(|id| RequeueResponse { id }),
    ))
}

/// GET /api/v1/sessions/:task/items/:id/preview
/// 获取预览图
pub async fn get_preview(
    State(app_state): State<AppState>,
    Path((task_id, item_id)): Path<(String, String)>,
) -> Result<Response, StatusCode> {
    let preview = app_state
        .session(&task_id)
        .and_then(|s| s.preview(&item_id))
        .map_err(|e| match e {
            SessionError::UnknownSession(_) | SessionError::Item(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        })?;

    match preview {
        Some((bytes, mime)) => Ok((
            [
                (header::CONTENT_TYPE, mime),
                (header::CACHE_CONTROL, "no-store"),
            ],
            bytes.as_ref().clone(),
        )
            .into_response()),
        None => Err(StatusCode::NOT_FOUND),
    }
}
