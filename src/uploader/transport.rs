// 批次传输接口
//
// 执行器只通过 BatchTransport 发起网络传输，真实实现见 portal::client，
// 测试中使用内存实现

use crate::uploader::item::FilePayload;
use crate::uploader::throttle::ProgressSender;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// 上传目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTarget {
    pub task_id: String,
    pub unit_id: String,
    /// 选中的文件夹节点，扁平模式为 None
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
}

/// 批次中的一个文件
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub item_id: String,
    pub payload: FilePayload,
}

/// 一次批次上传请求
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub target: UploadTarget,
    pub batch_index: usize,
    /// 按批次顺序排列，与字节区间一一对应
    pub files: Vec<BatchFile>,
}

impl BatchRequest {
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.payload.size).sum()
    }
}

/// 传输错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("网络错误: {0}")]
    Network(String),
    #[error("上传失败，服务器返回 {status}: {message}")]
    Status { status: u16, message: String },
    #[error("存储为只读，暂时无法上传")]
    ReadOnlyStorage,
    #[error("服务器拒绝上传: {0}")]
    Rejected(String),
    #[error("上传已取消")]
    Canceled,
    #[error("读取本地文件失败: {0}")]
    Io(String),
    #[error("上传响应解析失败: {0}")]
    InvalidResponse(String),
}

impl TransferError {
    pub fn is_canceled(&self) -> bool {
        matches!(self, TransferError::Canceled)
    }
}

impl From<reqwest::Error> for TransferError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            TransferError::InvalidResponse(e.to_string())
        } else {
            TransferError::Network(e.to_string())
        }
    }
}

/// 批次传输
///
/// 实现方需要：
/// - 通过 `progress` 上报整批已发送字节数（按批次拼接顺序累计）
/// - `cancel` 触发后尽快放弃请求并返回 `TransferError::Canceled`
/// - 成功时返回新存储文件的 URL
#[async_trait]
pub trait BatchTransport: Send + Sync {
    async fn send_batch(
        &self,
        request: BatchRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, TransferError>;
}
