// API处理器模块

pub mod items;
pub mod sessions;
pub mod units;
pub mod upload;

pub use items::*;
pub use sessions::*;
pub use units::*;
pub use upload::*;

use crate::session::SessionError;
use axum::Json;
use serde::Serialize;
use tracing::warn;

/// 统一API响应格式
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// 状态码 (0: 成功, 其他: 错误码)
    pub code: i32,
    /// 消息
    pub message: String,
    /// 数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: String) -> Self {
        Self {
            code,
            message,
            data: None,
        }
    }
}

impl<T> From<SessionError> for ApiResponse<T> {
    fn from(err: SessionError) -> Self {
        Self::error(err.code(), err.to_string())
    }
}

/// 业务错误写入响应体，HTTP 状态码保持 200
pub(crate) fn reply<T>(result: Result<T, SessionError>) -> Json<ApiResponse<T>> {
    match result {
        Ok(data) => Json(ApiResponse::success(data)),
        Err(e) => {
            warn!("API 请求失败: {}", e);
            Json(ApiResponse::from(e))
        }
    }
}
