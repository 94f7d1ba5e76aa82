// 应用状态

use crate::config::AppConfig;
use crate::portal::{PortalApi, PortalClient};
use crate::session::{ReportSession, SessionError};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::info;

/// 应用全局状态
#[derive(Clone)]
pub struct AppState {
    /// 应用配置
    pub config: Arc<AppConfig>,
    /// 门户接口客户端
    pub portal: Arc<dyn PortalApi>,
    /// 任务 ID → 报告会话
    pub sessions: Arc<DashMap<String, Arc<ReportSession>>>,
}

impl AppState {
    /// 使用真实的门户客户端创建应用状态
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let client = PortalClient::new(&config.portal, config.upload.progress_interval_ms)?;
        Ok(Self::with_portal(config, Arc::new(client)))
    }

    pub fn with_portal(config: AppConfig, portal: Arc<dyn PortalApi>) -> Self {
        Self {
            config: Arc::new(config),
            portal,
            sessions: Arc::new(DashMap::new()),
        }
    }

    pub fn session(&self, task_id: &str) -> Result<Arc<ReportSession>, SessionError> {
        self.sessions
            .get(task_id)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| SessionError::UnknownSession(task_id.to_string()))
    }

    /// 打开会话并加载文件夹结构
    ///
    /// 同一任务已有会话时先关闭旧会话
    pub async fn open_session(&self, task_id: &str, unit_ids: Vec<String>) -> Arc<ReportSession> {
        let session = ReportSession::new(
            task_id,
            unit_ids,
            Arc::clone(&self.portal),
            self.config.upload.clone(),
        );

        if let Some(old) = self.sessions.insert(task_id.to_string(), Arc::clone(&session)) {
            info!("替换已有会话: task={}", task_id);
            old.close();
        }

        session.load_schema().await;
        session
    }

    pub fn close_session(&self, task_id: &str) -> bool {
        match self.sessions.remove(task_id) {
            Some((_, session)) => {
                session.close();
                true
            }
            None => false,
        }
    }

    /// 关闭所有会话（退出时调用）
    pub fn shutdown(&self) {
        let task_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for task_id in task_ids {
            self.close_session(&task_id);
        }
        info!("所有会话已关闭");
    }
}
