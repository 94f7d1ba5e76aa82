// 门户接口数据类型

use serde::{Deserialize, Serialize};

/// 已存储文件列表响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExistingFilesResponse {
    #[serde(default)]
    pub files: Vec<String>,
}

/// 批次上传响应
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    #[serde(default)]
    pub urls: Vec<String>,
    /// 存储只读标记
    #[serde(default)]
    pub read_only: bool,
    /// 业务错误码，如 "READ_ONLY"
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// 只读错误码
pub const READ_ONLY_CODE: &str = "READ_ONLY";

impl UploadResponse {
    pub fn is_read_only(&self) -> bool {
        self.read_only
            || self
                .code
                .as_deref()
                .map(|c| c.eq_ignore_ascii_case(READ_ONLY_CODE))
                .unwrap_or(false)
    }

    /// 服务端给出的错误描述
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref().or(self.message.as_deref())
    }
}

/// 删除已存储文件请求
#[derive(Debug, Clone, Serialize)]
pub struct DeleteFileRequest<'a> {
    pub url: &'a str,
}

/// 删除已存储文件响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteFileResponse {
    /// 删除后的文件列表（可能缺失）
    #[serde(default)]
    pub files: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<String>,
}

/// 提交报告请求
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReportRequest<'a> {
    pub unit_ids: &'a [String],
}

/// 通用错误响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn parse(text: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(text)
            .ok()
            .and_then(|b| b.error.or(b.message))
    }
}
