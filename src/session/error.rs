// 会话错误

use crate::folders::GateReason;
use crate::uploader::ItemStateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("会话不存在: {0}")]
    UnknownSession(String),
    #[error("单元不存在: {0}")]
    UnknownUnit(String),
    #[error("文件夹不存在: {0}")]
    UnknownFolder(String),
    #[error("请先打开一个单元")]
    NoActiveUnit,
    #[error("已有上传正在进行")]
    RunInProgress,
    #[error("没有待上传的文件")]
    NothingToUpload,
    #[error("{0}")]
    GateClosed(GateReason),
    #[error("以下单元尚未上传照片: {}", .0.join(", "))]
    NotAllUploaded(Vec<String>),
    #[error(transparent)]
    Item(#[from] ItemStateError),
    #[error("{0}")]
    Portal(String),
}

impl SessionError {
    /// 响应中的业务错误码
    pub fn code(&self) -> i32 {
        match self {
            SessionError::UnknownSession(_)
            | SessionError::UnknownUnit(_)
            | SessionError::UnknownFolder(_) => 404,
            SessionError::Item(ItemStateError::NotFound(_)) => 404,
            SessionError::RunInProgress | SessionError::Item(_) => 409,
            SessionError::NoActiveUnit
            | SessionError::NothingToUpload
            | SessionError::GateClosed(_)
            | SessionError::NotAllUploaded(_) => 400,
            SessionError::Portal(_) => 502,
        }
    }
}
