// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 覆盖配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "PHOTO_UPLOADER_CONFIG";

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 门户接口配置
    #[serde(default)]
    pub portal: PortalConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 20MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    20 * 1024 * 1024
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// CORS允许的源（为空表示允许所有）
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18090,
            cors_origins: vec![],
        }
    }
}

/// 门户接口配置（任务系统的后端服务）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// 门户服务根地址，如 https://portal.example.com
    pub base_url: String,
    /// 单次请求超时（秒）。上传批次最大 20MB，需要留足时间
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 访问令牌（Bearer），为空时不携带
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
}

fn default_request_timeout_secs() -> u64 {
    300
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
            api_token: None,
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 单批次最大文件数
    #[serde(default = "default_max_batch_files")]
    pub max_batch_files: usize,
    /// 单批次最大字节数（单个超大文件除外）
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: u64,
    /// 单文件大小上限，超过则在选择阶段拒绝
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// 同时存在的预览图数量上限
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
    /// 预览图最长边（像素）
    #[serde(default = "default_preview_edge")]
    pub preview_edge: u32,
    /// 允许的文件扩展名（小写，不含点）
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// 成功提示自动消失时间（秒）
    #[serde(default = "default_notice_ttl_secs")]
    pub notice_ttl_secs: u64,
    /// 进度事件最小间隔（毫秒）
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

fn default_max_batch_files() -> usize {
    5
}

fn default_max_batch_bytes() -> u64 {
    20 * 1024 * 1024
}

fn default_max_file_size() -> u64 {
    50 * 1024 * 1024
}

fn default_preview_limit() -> usize {
    24
}

fn default_preview_edge() -> u32 {
    160
}

fn default_allowed_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "webp", "heic", "heif", "gif", "bmp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_notice_ttl_secs() -> u64 {
    3
}

fn default_progress_interval_ms() -> u64 {
    100
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_batch_files: default_max_batch_files(),
            max_batch_bytes: default_max_batch_bytes(),
            max_file_size: default_max_file_size(),
            preview_limit: default_preview_limit(),
            preview_edge: default_preview_edge(),
            allowed_extensions: default_allowed_extensions(),
            notice_ttl_secs: default_notice_ttl_secs(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl UploadConfig {
    /// 校验批次上限
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_files == 0 {
            anyhow::bail!("upload.max_batch_files 必须大于 0");
        }
        if self.max_batch_bytes == 0 {
            anyhow::bail!("upload.max_batch_bytes 必须大于 0");
        }
        if self.max_file_size == 0 {
            anyhow::bail!("upload.max_file_size 必须大于 0");
        }
        Ok(())
    }

    /// 扩展名是否允许（忽略大小写）
    pub fn is_extension_allowed(&self, ext: &str) -> bool {
        let ext = ext.to_ascii_lowercase();
        self.allowed_extensions.iter().any(|e| *e == ext)
    }
}

impl AppConfig {
    /// 解析配置文件路径（环境变量优先）
    pub fn resolve_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传参数验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.upload.validate().context("保存配置失败：上传参数无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                // 只在文件不存在时写回默认配置，避免覆盖用户写错的文件
                if !std::path::Path::new(path).exists() {
                    if let Err(e) = default_config.save_to_file(path).await {
                        tracing::error!("保存默认配置失败: {}", e);
                    }
                }

                default_config
            }
        }
    }
}
