// 门户服务接口
//
// 文件夹结构、已存储文件、批次上传、删除文件、提交报告都由门户服务提供。
// 会话层只依赖 PortalApi，真实实现为 PortalClient

pub mod client;
pub mod types;

pub use client::PortalClient;
pub use types::{DeleteFileResponse, ExistingFilesResponse, UploadResponse};

use crate::folders::FolderSchema;
use crate::uploader::BatchTransport;
use anyhow::Result;
use async_trait::async_trait;

/// 门户服务接口
#[async_trait]
pub trait PortalApi: BatchTransport {
    /// 获取任务的文件夹结构
    async fn fetch_folder_schema(&self, task_id: &str) -> Result<FolderSchema>;

    /// 获取单元已存储的文件 URL（单元从未上传过时为空）
    async fn fetch_existing_files(&self, task_id: &str, unit_id: &str) -> Result<Vec<String>>;

    /// 删除已存储文件，返回删除后的文件列表（服务端可能不返回）
    async fn delete_existing_file(
        &self,
        task_id: &str,
        unit_id: &str,
        url: &str,
    ) -> Result<Option<Vec<String>>>;

    /// 提交报告
    async fn submit_report(&self, task_id: &str, unit_ids: &[String]) -> Result<()>;
}
