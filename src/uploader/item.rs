// 上传项定义
//
// 一个本地文件从被选中到终态的完整生命周期：
// ready → uploading → {done, error, canceled}
// 终态之间不可转换，只能移除后重新添加

use crate::uploader::preview::PreviewHandle;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// 取消时写入每个上传项的固定提示
pub const CANCELED_MESSAGE: &str = "上传已取消";

/// 上传项状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UploadItemStatus {
    /// 等待上传
    Ready,
    /// 上传中
    Uploading,
    /// 已完成
    Done,
    /// 失败
    Error,
    /// 已取消
    Canceled,
}

impl UploadItemStatus {
    /// 是否为终态
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Canceled)
    }

    /// 用户是否可以移除
    pub fn is_removable(self) -> bool {
        self != Self::Uploading
    }
}

/// 非法状态转换
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemStateError {
    #[error("上传项 {id} 状态为 {from:?}，不能转换为 {to:?}")]
    IllegalTransition {
        id: String,
        from: UploadItemStatus,
        to: UploadItemStatus,
    },
    #[error("上传项 {0} 正在上传，不能移除")]
    Busy(String),
    #[error("上传项 {0} 不存在")]
    NotFound(String),
}

/// 待上传文件的原始数据描述
///
/// 只保存路径和元信息，字节在传输时才读取
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FilePayload {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 文件名（上传时作为 multipart 文件名）
    pub file_name: String,
    /// 文件大小
    pub size: u64,
    /// MIME 类型
    pub mime: String,
    /// 修改时间（毫秒时间戳）
    pub modified_ms: i64,
}

impl FilePayload {
    /// 参与批次规划的字节数，至少为 1，避免零长度区间
    pub fn planned_size(&self) -> u64 {
        self.size.max(1)
    }
}

/// 生成上传项标识
///
/// 文件名 + 修改时间 + 随机盐值，允许同名文件重复添加
pub fn generate_item_id(file_name: &str, modified_ms: i64) -> String {
    let salt: u32 = rand::random();
    format!("{}-{}-{:08x}", file_name, modified_ms, salt)
}

/// 上传项
#[derive(Debug)]
pub struct UploadItem {
    /// 稳定标识
    pub id: String,
    /// 文件数据
    pub payload: FilePayload,
    /// 预览图（仅前 N 个上传项有）
    pub preview: Option<PreviewHandle>,
    progress: u8,
    status: UploadItemStatus,
    error: Option<String>,
    /// 加入队列的时间 (Unix timestamp)
    pub added_at: i64,
}

impl UploadItem {
    /// 创建新的上传项（状态为 ready）
    pub fn new(payload: FilePayload, preview: Option<PreviewHandle>) -> Self {
        Self {
            id: generate_item_id(&payload.file_name, payload.modified_ms),
            payload,
            preview,
            progress: 0,
            status: UploadItemStatus::Ready,
            error: None,
            added_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn status(&self) -> UploadItemStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn illegal(&self, to: UploadItemStatus) -> ItemStateError {
        ItemStateError::IllegalTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    /// ready → uploading
    pub fn mark_uploading(&mut self) -> Result<(), ItemStateError> {
        match self.status {
            UploadItemStatus::Ready => {
                self.status = UploadItemStatus::Uploading;
                self.progress = 0;
                Ok(())
            }
            UploadItemStatus::Uploading => Ok(()),
            _ => Err(self.illegal(UploadItemStatus::Uploading)),
        }
    }

    /// 更新进度（只增不减，仅在 uploading 状态生效）
    ///
    /// 返回进度是否发生变化
    pub fn advance_progress(&mut self, percent: u8) -> bool {
        if self.status != UploadItemStatus::Uploading {
            return false;
        }
        let percent = percent.min(100);
        if percent > self.progress {
            self.progress = percent;
            true
        } else {
            false
        }
    }

    /// uploading → done
    pub fn mark_done(&mut self) -> Result<(), ItemStateError> {
        match self.status {
            UploadItemStatus::Uploading => {
                self.status = UploadItemStatus::Done;
                self.progress = 100;
                self.error = None;
                Ok(())
            }
            _ => Err(self.illegal(UploadItemStatus::Done)),
        }
    }

    /// uploading → error
    pub fn mark_error(&mut self, message: impl Into<String>) -> Result<(), ItemStateError> {
        match self.status {
            UploadItemStatus::Uploading => {
                self.status = UploadItemStatus::Error;
                self.error = Some(message.into());
                Ok(())
            }
            _ => Err(self.illegal(UploadItemStatus::Error)),
        }
    }

    /// ready / uploading → canceled
    pub fn mark_canceled(&mut self, message: impl Into<String>) -> Result<(), ItemStateError> {
        match self.status {
            UploadItemStatus::Ready | UploadItemStatus::Uploading => {
                self.status = UploadItemStatus::Canceled;
                self.error = Some(message.into());
                Ok(())
            }
            _ => Err(self.illegal(UploadItemStatus::Canceled)),
        }
    }
}

/// 上传项快照（对外展示）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItemInfo {
    pub id: String,
    pub file_name: String,
    pub size: u64,
    pub status: UploadItemStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub has_preview: bool,
}

impl From<&UploadItem> for UploadItemInfo {
    fn from(item: &UploadItem) -> Self {
        Self {
            id: item.id.clone(),
            file_name: item.payload.file_name.clone(),
            size: item.payload.size,
            status: item.status,
            progress: item.progress,
            error: item.error.clone(),
            has_preview: item.preview.is_some(),
        }
    }
}

/// 当前时间（毫秒），用于没有修改时间的文件
pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn test_payload(name: &str, size: u64) -> FilePayload {
    FilePayload {
        local_path: PathBuf::from(format!("/tmp/{}", name)),
        file_name: name.to_string(),
        size,
        mime: "image/jpeg".to_string(),
        modified_ms: 1_700_000_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_creation() {
        let item = UploadItem::new(test_payload("a.jpg", 1024), None);
        assert_eq!(item.status(), UploadItemStatus::Ready);
        assert_eq!(item.progress(), 0);
        assert!(item.error().is_none());
        assert!(item.id.starts_with("a.jpg-1700000000000-"));
    }

    #[test]
    fn test_duplicate_names_get_distinct_ids() {
        let a = UploadItem::new(test_payload("same.jpg", 1), None);
        let b = UploadItem::new(test_payload("same.jpg", 1), None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut item = UploadItem::new(test_payload("a.jpg", 1024), None);
        item.mark_uploading().unwrap();
        assert!(item.advance_progress(40));
        assert!(!item.advance_progress(30));
        assert_eq!(item.progress(), 40);

        item.mark_done().unwrap();
        assert_eq!(item.status(), UploadItemStatus::Done);
        assert_eq!(item.progress(), 100);
    }

    #[test]
    fn test_terminal_states_are_sticky() {
        let mut item = UploadItem::new(test_payload("a.jpg", 1024), None);
        item.mark_uploading().unwrap();
        item.mark_error("网络错误").unwrap();
        assert_eq!(item.error(), Some("网络错误"));

        assert!(item.mark_uploading().is_err());
        assert!(item.mark_done().is_err());
        assert!(item.mark_canceled(CANCELED_MESSAGE).is_err());
        assert!(!item.advance_progress(90));
        assert_eq!(item.status(), UploadItemStatus::Error);
    }

    #[test]
    fn test_ready_can_be_canceled_but_not_completed() {
        let mut item = UploadItem::new(test_payload("a.jpg", 1024), None);
        assert!(item.mark_done().is_err());
        item.mark_canceled(CANCELED_MESSAGE).unwrap();
        assert_eq!(item.status(), UploadItemStatus::Canceled);
        assert_eq!(item.error(), Some(CANCELED_MESSAGE));
    }

    #[test]
    fn test_removable_states() {
        assert!(UploadItemStatus::Ready.is_removable());
        assert!(!UploadItemStatus::Uploading.is_removable());
        assert!(UploadItemStatus::Done.is_removable());
        assert!(UploadItemStatus::Error.is_removable());
        assert!(UploadItemStatus::Canceled.is_removable());
    }

    #[test]
    fn test_planned_size_floor() {
        assert_eq!(test_payload("empty.jpg", 0).planned_size(), 1);
        assert_eq!(test_payload("x.jpg", 7).planned_size(), 7);
    }
}
