//! 文件选择校验
//!
//! 选择阶段被拒绝的文件只产生提示，不影响队列中已有的上传项

use crate::config::UploadConfig;
use crate::uploader::item::{now_millis, FilePayload};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;

/// 选择阶段错误
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("文件不存在: {0}")]
    NotFound(PathBuf),
    #[error("不是普通文件: {0}")]
    NotAFile(PathBuf),
    #[error("不支持的文件类型: {name}")]
    UnsupportedType { name: String },
    #[error("文件过大: {name} ({size} 字节，上限 {limit} 字节)")]
    TooLarge { name: String, size: u64, limit: u64 },
    #[error("读取文件信息失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 根据扩展名推断 MIME 类型
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// 校验本地文件并生成上传数据描述
pub async fn inspect_file(path: &Path, config: &UploadConfig) -> Result<FilePayload, IntakeError> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(IntakeError::NotFound(path.to_path_buf()))
        }
        Err(source) => {
            return Err(IntakeError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_file() {
        return Err(IntakeError::NotAFile(path.to_path_buf()));
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| IntakeError::NotAFile(path.to_path_buf()))?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    if !config.is_extension_allowed(ext) {
        return Err(IntakeError::UnsupportedType { name: file_name });
    }

    let size = metadata.len();
    if size > config.max_file_size {
        return Err(IntakeError::TooLarge {
            name: file_name,
            size,
            limit: config.max_file_size,
        });
    }

    let modified_ms = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(now_millis);

    Ok(FilePayload {
        local_path: path.to_path_buf(),
        file_name,
        size,
        mime: mime_for_extension(ext).to_string(),
        modified_ms,
    })
}
