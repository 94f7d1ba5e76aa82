// 上传运行API处理器

use crate::server::handlers::{reply, ApiResponse};
use crate::server::AppState;
use crate::uploader::RunSnapshot;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 启动上传请求（unitId 缺省时使用当前打开的单元）
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartUploadRequest {
    #[serde(default)]
    pub unit_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelUploadResponse {
    pub canceled: bool,
}

/// POST /api/v1/sessions/:task/upload
/// 启动上传（后台执行，进度通过会话快照轮询）
pub async fn start_upload(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
    req: Option<Json<StartUploadRequest>>,
) -> Result<Json<ApiResponse<RunSnapshot>>, StatusCode> {
    let unit_id = req.and_then(|Json(r)| r.unit_id);
    info!("API: 启动上传 task={}, unit={:?}", task_id, unit_id);
    Ok(reply(
        app_state
            .session(&task_id)
            .and_then(|s| s.start_upload(unit_id)),
    ))
}

/// POST /api/v1/sessions/:task/upload/cancel
/// 取消当前上传
pub async fn cancel_upload(
    State(app_state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<ApiResponse<CancelUploadResponse>>, StatusCode> {
    info!("API: 取消上传 task={}", task_id);
    Ok(reply(
        app_state
            .session(&task_id)
            .map(|s| CancelUploadResponse {
                canceled: s.cancel_upload(),
            }),
    ))
}
