// 提示消息
//
// 每个关注点（上传 / 文件夹结构 / 删除 / 提交）只保留最近一条，
// 新消息覆盖旧消息；成功提示在固定时间后自动消失

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 关注点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Concern {
    Upload,
    Schema,
    Deletion,
    Submission,
}

impl Concern {
    pub const ALL: [Concern; 4] = [
        Concern::Upload,
        Concern::Schema,
        Concern::Deletion,
        Concern::Submission,
    ];
}

impl std::str::FromStr for Concern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "upload" => Ok(Concern::Upload),
            "schema" => Ok(Concern::Schema),
            "deletion" => Ok(Concern::Deletion),
            "submission" => Ok(Concern::Submission),
            other => Err(format!("未知的提示类型: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notice {
    pub concern: Concern,
    pub kind: NoticeKind,
    pub message: String,
    pub created_at: i64,
    #[serde(skip)]
    issued: Option<Instant>,
}

#[derive(Debug)]
pub struct NoticeBoard {
    notices: HashMap<Concern, Notice>,
    success_ttl: Duration,
}

impl NoticeBoard {
    pub fn new(success_ttl: Duration) -> Self {
        Self {
            notices: HashMap::new(),
            success_ttl,
        }
    }

    pub fn post(&mut self, concern: Concern, kind: NoticeKind, message: impl Into<String>) {
        self.notices.insert(
            concern,
            Notice {
                concern,
                kind,
                message: message.into(),
                created_at: chrono::Utc::now().timestamp(),
                issued: Some(Instant::now()),
            },
        );
    }

    pub fn success(&mut self, concern: Concern, message: impl Into<String>) {
        self.post(concern, NoticeKind::Success, message);
    }

    pub fn warning(&mut self, concern: Concern, message: impl Into<String>) {
        self.post(concern, NoticeKind::Warning, message);
    }

    pub fn error(&mut self, concern: Concern, message: impl Into<String>) {
        self.post(concern, NoticeKind::Error, message);
    }

    fn is_expired(&self, notice: &Notice) -> bool {
        notice.kind == NoticeKind::Success
            && notice
                .issued
                .map(|t| t.elapsed() >= self.success_ttl)
                .unwrap_or(false)
    }

    /// 当前提示（已过期的成功提示视为不存在）
    pub fn current(&self, concern: Concern) -> Option<&Notice> {
        self.notices
            .get(&concern)
            .filter(|notice| !self.is_expired(notice))
    }

    pub fn dismiss(&mut self, concern: Concern) -> bool {
        self.notices.remove(&concern).is_some()
    }

    pub fn clear(&mut self, concern: Concern) {
        self.notices.remove(&concern);
    }

    /// 所有未过期的提示
    pub fn active(&self) -> Vec<Notice> {
        Concern::ALL
            .iter()
            .filter_map(|c| self.current(*c).cloned())
            .collect()
    }
}
