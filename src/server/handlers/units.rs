// 单元与文件夹API处理器

use crate::server::handlers::{reply, ApiResponse};
use crate::server::AppState;
use crate::session::UnitView;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// 选中文件夹请求（folderId 为空表示根目录）
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectFolderRequest {
    #[serde(default)]
    pub folder_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFolderRequest {
    pub folder_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteStoredFileRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteStoredFileResponse {
    pub remaining: usize,
}

/// POST /api/v1/sessions/:task/units/:unit/open
/// 打开单元并重新加载已上传文件
pub async fn open_unit(
    State(app_state): State<AppState>,
    Path((task_id, unit_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<UnitView>>, StatusCode> {
    info!("API: 打开单元 task={}, unit={}", task_id, unit_id);
    let result = match app_state.session(&task_id) {
        Ok(session) => session.open_unit(&unit_id).await,
        Err(e) => Err(e),
    };
    Ok(reply(result))
}

/// GET /api/v1/sessions/:task/units/:unit/tree
/// 获取文件夹树（可见行与文件数）
pub async fn get_unit_tree(
    State(app_state): State<AppState>,
    Path((task_id, unit_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<UnitView>>, StatusCode> {
    Ok(reply(
        app_state
            .session(&task_id)
            .and_then(|s| s.unit_view(&unit_id)),
    ))
}

/// POST /api/v1/sessions/:task/units/:unit/select
/// 选中上传目标文件夹
pub async fn select_folder(
    State(app_state): State<AppState>,
    Path((task_id, unit_id)): Path<(String, String)>,
    Json(req): Json<SelectFolderRequest>,
) -> Result<Json<ApiResponse<UnitView>>, StatusCode> {
    let result = app_state.session(&task_id).and_then(|s| {
        s.select_folder(&unit_id, req.folder_id)?;
        s.unit_view(&unit_id)
    });
    Ok(reply(result))
}

/// POST /api/v1/sessions/:task/units/:unit/toggle
/// 展开 / 折叠文件夹
pub async fn toggle_folder(
    State(app_state): State<AppState>,
    Path((task_id, unit_id)): Path<(String, String)>,
    Json(req): Json<ToggleFolderRequest>,
) -> Result<Json<ApiResponse<UnitView>>, StatusCode> {
    let result = app_state.session(&task_id).and_then(|s| {
        s.toggle_folder(&unit_id, &req.folder_id)?;
        s.unit_view(&unit_id)
    });
    Ok(reply(result))
}

/// GET /api/v1/sessions/:task/units/:unit/files
/// 选中文件夹中的已上传文件
pub async fn list_stored_files(
    State(app_state): State<AppState>,
    Path((task_id, unit_id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<Vec<String>>>, StatusCode> {
    Ok(reply(
        app_state
            .session(&task_id)
            .and_then(|s| s.files_in_selection(&unit_id)),
    ))
}

/// DELETE /api/v1/sessions/:task/units/:unit/files
/// 删除已上传文件
pub async fn delete_stored_file(
    State(app_state): State<AppState>,
    Path((task_id, unit_id)): Path<(String, String)>,
    Json(req): Json<DeleteStoredFileRequest>,
) -> Result<Json<ApiResponse<DeleteStoredFileResponse>>, StatusCode> {
    info!("API: 删除文件 unit={}, url={}", unit_id, req.url);
    let result = match app_state.session(&task_id) {
        Ok(session) => session
            .delete_stored_file(&unit_id, &req.url)
            .await
            .map(|remaining| DeleteStoredFileResponse { remaining }),
        Err(e) => Err(e),
    };
    Ok(reply(result))
}
