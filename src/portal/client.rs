// 门户服务客户端
//
// 所有接口都在 {base}/api/tasks/{taskId} 下：
// - GET    /folder-structure
// - GET    /units/{unitId}/files          404 视为空列表
// - POST   /units/{unitId}/photos         multipart，每批一次请求
// - DELETE /units/{unitId}/files
// - POST   /photo-report

use crate::config::PortalConfig;
use crate::folders::{FolderSchema, FolderSchemaResponse};
use crate::portal::types::{
    DeleteFileRequest, DeleteFileResponse, ErrorBody, ExistingFilesResponse, SubmitReportRequest,
    UploadResponse,
};
use crate::portal::PortalApi;
use crate::uploader::{
    BatchRequest, BatchTransport, ProgressReporter, ProgressSender, TransferError,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, StatusCode};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("photo-report-uploader/", env!("CARGO_PKG_VERSION"));

/// 错误信息中保留的响应体长度
const MAX_ERROR_BODY_LEN: usize = 200;

/// 门户服务客户端
#[derive(Debug, Clone)]
pub struct PortalClient {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    /// 上传进度上报间隔（毫秒）
    progress_interval_ms: u64,
}

impl PortalClient {
    pub fn new(config: &PortalConfig, progress_interval_ms: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .user_agent(USER_AGENT)
            .build()
            .context("创建 HTTP 客户端失败")?;

        info!("门户客户端初始化完成: base_url={}", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone().filter(|t| !t.is_empty()),
            progress_interval_ms,
        })
    }

    fn task_url(&self, task_id: &str, suffix: &str) -> String {
        format!(
            "{}/api/tasks/{}{}",
            self.base_url,
            urlencoding::encode(task_id),
            suffix
        )
    }

    fn unit_url(&self, task_id: &str, unit_id: &str, suffix: &str) -> String {
        self.task_url(
            task_id,
            &format!("/units/{}{}", urlencoding::encode(unit_id), suffix),
        )
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// 构建批次 multipart 表单，文件内容以流的方式读取并上报进度
    async fn build_form(
        &self,
        request: &BatchRequest,
        reporter: &ProgressReporter,
    ) -> Result<Form, TransferError> {
        let target = &request.target;
        let mut form = Form::new()
            .text("unitId", target.unit_id.clone())
            .text("taskId", target.task_id.clone());
        if let Some(folder_id) = &target.folder_id {
            form = form.text("folderId", folder_id.clone());
        }

        for file in &request.files {
            let payload = &file.payload;
            let io_error =
                |e: std::io::Error| TransferError::Io(format!("{}: {}", payload.file_name, e));

            let handle = tokio::fs::File::open(&payload.local_path)
                .await
                .map_err(io_error)?;
            let length = handle.metadata().await.map_err(io_error)?.len();

            let reporter = reporter.clone();
            let stream = ReaderStream::new(handle).inspect_ok(move |chunk| {
                reporter.add(chunk.len() as u64);
            });

            let part = Part::stream_with_length(Body::wrap_stream(stream), length)
                .file_name(payload.file_name.clone())
                .mime_str(&payload.mime)?;
            form = form.part("files", part);
        }

        Ok(form)
    }
}

/// 解析批次上传响应
pub(crate) fn parse_upload_response(
    status: StatusCode,
    text: &str,
) -> Result<Vec<String>, TransferError> {
    let parsed = serde_json::from_str::<UploadResponse>(text);
    let body = parsed.as_ref().cloned().unwrap_or_default();

    if status == StatusCode::LOCKED || body.is_read_only() {
        return Err(TransferError::ReadOnlyStorage);
    }

    if !status.is_success() {
        let message = body
            .error_message()
            .map(str::to_string)
            .unwrap_or_else(|| truncate(text));
        return Err(TransferError::Status {
            status: status.as_u16(),
            message,
        });
    }

    let body = parsed.map_err(|e| TransferError::InvalidResponse(e.to_string()))?;
    if let Some(error) = body.error {
        return Err(TransferError::Rejected(error));
    }

    Ok(body.urls)
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_ERROR_BODY_LEN).collect()
}

/// 非成功状态码的错误描述
fn describe_failure(status: StatusCode, text: &str) -> String {
    ErrorBody::parse(text).unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), truncate(text)))
}

#[async_trait]
impl BatchTransport for PortalClient {
    async fn send_batch(
        &self,
        request: BatchRequest,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Result<Vec<String>, TransferError> {
        let reporter = ProgressReporter::new(progress, self.progress_interval_ms);
        let url = self.unit_url(&request.target.task_id, &request.target.unit_id, "/photos");

        debug!(
            "发送上传批次: url={}, batch={}, files={}, bytes={}",
            url,
            request.batch_index,
            request.files.len(),
            request.total_bytes()
        );

        let exchange = async {
            let form = self.build_form(&request, &reporter).await?;
            let response = self
                .authorize(self.client.post(&url))
                .multipart(form)
                .send()
                .await?;
            let status = response.status();
            let text = response.text().await?;
            reporter.flush();

            debug!("上传批次响应: status={}, body={}", status, truncate(&text));
            parse_upload_response(status, &text)
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("上传批次已中止: batch={}", request.batch_index);
                Err(TransferError::Canceled)
            }
            result = exchange => result,
        }
    }
}

#[async_trait]
impl PortalApi for PortalClient {
    async fn fetch_folder_schema(&self, task_id: &str) -> Result<FolderSchema> {
        let url = self.task_url(task_id, "/folder-structure");
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .context("获取文件夹结构请求失败")?;

        let status = response.status();
        let text = response.text().await.context("读取文件夹结构响应失败")?;
        if !status.is_success() {
            anyhow::bail!("获取文件夹结构失败: {}", describe_failure(status, &text));
        }

        let parsed: FolderSchemaResponse = serde_json::from_str(&text)
            .with_context(|| format!("解析文件夹结构失败: body={}", truncate(&text)))?;
        Ok(parsed.into())
    }

    async fn fetch_existing_files(&self, task_id: &str, unit_id: &str) -> Result<Vec<String>> {
        let url = self.unit_url(task_id, unit_id, "/files");
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .context("获取已上传文件请求失败")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!("单元尚未上传过文件: unit={}", unit_id);
            return Ok(Vec::new());
        }

        let text = response.text().await.context("读取已上传文件响应失败")?;
        if !status.is_success() {
            anyhow::bail!("获取已上传文件失败: {}", describe_failure(status, &text));
        }

        let parsed: ExistingFilesResponse = serde_json::from_str(&text)
            .with_context(|| format!("解析已上传文件失败: body={}", truncate(&text)))?;
        Ok(parsed.files)
    }

    async fn delete_existing_file(
        &self,
        task_id: &str,
        unit_id: &str,
        url: &str,
    ) -> Result<Option<Vec<String>>> {
        let endpoint = self.unit_url(task_id, unit_id, "/files");
        let response = self
            .authorize(self.client.delete(&endpoint))
            .json(&DeleteFileRequest { url })
            .send()
            .await
            .context("删除文件请求失败")?;

        let status = response.status();
        let text = response.text().await.context("读取删除文件响应失败")?;
        if !status.is_success() {
            anyhow::bail!("{}", describe_failure(status, &text));
        }

        let parsed: DeleteFileResponse = if text.trim().is_empty() {
            DeleteFileResponse::default()
        } else {
            serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("删除文件响应无法解析，按成功处理: {}", e);
                DeleteFileResponse::default()
            })
        };

        if let Some(error) = parsed.error {
            anyhow::bail!(error);
        }
        Ok(parsed.files)
    }

    async fn submit_report(&self, task_id: &str, unit_ids: &[String]) -> Result<()> {
        let url = self.task_url(task_id, "/photo-report");
        let response = self
            .authorize(self.client.post(&url))
            .json(&SubmitReportRequest { unit_ids })
            .send()
            .await
            .context("提交报告请求失败")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("{}", describe_failure(status, &text));
        }

        info!("报告已提交: task={}, units={}", task_id, unit_ids.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::item::FilePayload;
    use crate::uploader::{progress_channel, BatchFile, UploadTarget};
    use axum::body::Bytes;
    use axum::extract::Path;
    use axum::http::StatusCode as AxumStatus;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    async fn folder_structure() -> Json<Value> {
        Json(json!({
            "folders": [
                { "id": 1, "name": "Docs" },
                { "id": 2, "name": "Scans", "parentId": 1 }
            ]
        }))
    }

    async fn list_files(Path((_task, unit)): Path<(String, String)>) -> (AxumStatus, Json<Value>) {
        if unit == "BS-1" {
            (
                AxumStatus::OK,
                Json(json!({ "files": ["https://s.example.com/units/BS-1/a.jpg"] })),
            )
        } else {
            (AxumStatus::NOT_FOUND, Json(json!({ "error": "not found" })))
        }
    }

    async fn delete_file(Json(body): Json<Value>) -> Json<Value> {
        if body["url"] == "missing" {
            Json(json!({ "error": "文件不存在" }))
        } else {
            Json(json!({ "files": [] }))
        }
    }

    async fn upload(Path((_task, unit)): Path<(String, String)>, body: Bytes) -> (AxumStatus, Json<Value>) {
        if unit == "LOCKED" {
            return (AxumStatus::LOCKED, Json(json!({ "error": "locked" })));
        }
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("name=\"folderId\""));
        assert!(text.contains("filename=\"a.jpg\""));
        assert!(text.contains("filename=\"b.jpg\""));
        (
            AxumStatus::OK,
            Json(json!({ "urls": ["https://s.example.com/units/BS-1/Docs/a.jpg", "https://s.example.com/units/BS-1/Docs/b.jpg"] })),
        )
    }

    async fn submit(Json(body): Json<Value>) -> (AxumStatus, Json<Value>) {
        if body["unitIds"].as_array().map(|a| a.is_empty()).unwrap_or(true) {
            (AxumStatus::BAD_REQUEST, Json(json!({ "error": "没有单元" })))
        } else {
            (AxumStatus::OK, Json(json!({})))
        }
    }

    async fn spawn_portal() -> PortalClient {
        let app = Router::new()
            .route("/api/tasks/:task/folder-structure", get(folder_structure))
            .route("/api/tasks/:task/units/:unit/files", get(list_files).delete(delete_file))
            .route("/api/tasks/:task/units/:unit/photos", post(upload))
            .route("/api/tasks/:task/photo-report", post(submit));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = PortalConfig {
            base_url: format!("http://{}/", addr),
            ..Default::default()
        };
        PortalClient::new(&config, 0).unwrap()
    }

    fn batch(dir: &TempDir, unit: &str) -> BatchRequest {
        let files = [("a.jpg", 300usize), ("b.jpg", 500usize)]
            .iter()
            .map(|(name, size)| {
                let path = dir.path().join(name);
                std::fs::write(&path, vec![7u8; *size]).unwrap();
                BatchFile {
                    item_id: name.to_string(),
                    payload: FilePayload {
                        local_path: path,
                        file_name: name.to_string(),
                        size: *size as u64,
                        mime: "image/jpeg".to_string(),
                        modified_ms: 0,
                    },
                }
            })
            .collect();

        BatchRequest {
            target: UploadTarget {
                task_id: "t1".to_string(),
                unit_id: unit.to_string(),
                folder_id: Some("1".to_string()),
            },
            batch_index: 0,
            files,
        }
    }

    #[test]
    fn test_parse_upload_response() {
        assert_eq!(
            parse_upload_response(StatusCode::OK, r#"{"urls":["u1"]}"#).unwrap(),
            vec!["u1".to_string()]
        );
        assert_eq!(
            parse_upload_response(StatusCode::OK, r#"{"readOnly":true}"#).unwrap_err(),
            TransferError::ReadOnlyStorage
        );
        assert_eq!(
            parse_upload_response(StatusCode::FORBIDDEN, r#"{"code":"READ_ONLY"}"#).unwrap_err(),
            TransferError::ReadOnlyStorage
        );
        assert!(matches!(
            parse_upload_response(StatusCode::BAD_GATEWAY, "upstream down").unwrap_err(),
            TransferError::Status { status: 502, ref message } if message == "upstream down"
        ));
        assert_eq!(
            parse_upload_response(StatusCode::OK, r#"{"error":"bad type"}"#).unwrap_err(),
            TransferError::Rejected("bad type".to_string())
        );
        assert!(matches!(
            parse_upload_response(StatusCode::OK, "not json").unwrap_err(),
            TransferError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_urls_are_encoded() {
        let client = PortalClient::new(
            &PortalConfig {
                base_url: "https://portal.example.com/".to_string(),
                ..Default::default()
            },
            100,
        )
        .unwrap();
        assert_eq!(
            client.unit_url("t 1", "BS/1", "/files"),
            "https://portal.example.com/api/tasks/t%201/units/BS%2F1/files"
        );
    }

    #[tokio::test]
    async fn test_schema_and_files() {
        let client = spawn_portal().await;

        let schema = client.fetch_folder_schema("t1").await.unwrap();
        let paths = schema.resolve();
        assert_eq!(paths[1].path, "Docs/Scans");

        assert_eq!(client.fetch_existing_files("t1", "BS-1").await.unwrap().len(), 1);
        // 404 视为空列表
        assert!(client.fetch_existing_files("t1", "NEW").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_batch_reports_progress() {
        let client = spawn_portal().await;
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = progress_channel();

        let urls = client
            .send_batch(batch(&dir, "BS-1"), tx, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(urls.len(), 2);

        let mut last = 0;
        while let Ok(loaded) = rx.try_recv() {
            assert!(loaded >= last);
            last = loaded;
        }
        assert_eq!(last, 800);
    }

    #[tokio::test]
    async fn test_upload_read_only_and_cancel() {
        let client = spawn_portal().await;
        let dir = TempDir::new().unwrap();

        let (tx, _rx) = progress_channel();
        let err = client
            .send_batch(batch(&dir, "LOCKED"), tx, CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TransferError::ReadOnlyStorage);

        let (tx, _rx) = progress_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .send_batch(batch(&dir, "BS-1"), tx, cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[tokio::test]
    async fn test_delete_and_submit() {
        let client = spawn_portal().await;

        let files = client
            .delete_existing_file("t1", "BS-1", "https://s.example.com/units/BS-1/a.jpg")
            .await
            .unwrap();
        assert_eq!(files, Some(Vec::new()));

        let err = client
            .delete_existing_file("t1", "BS-1", "missing")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("文件不存在"));

        client
            .submit_report("t1", &["BS-1".to_string()])
            .await
            .unwrap();
        let err = client.submit_report("t1", &[]).await.unwrap_err();
        assert!(err.to_string().contains("没有单元"));
    }
}
