// 上传批次规划
//
// 把待上传项按顺序贪心地切成若干批次，每批一次 multipart 请求：
// - 每批文件数 <= max_files
// - 每批字节数 <= max_bytes（单个超大文件独占一批，不拆分）
// - 批次顺序与输入顺序一致，每个上传项只属于一个批次
//
// 每个上传项在批次"拼接负载"中占据连续的字节区间，
// 传输进度（整批已发送字节数）据此换算为单个文件的进度

use crate::config::UploadConfig;
use serde::Serialize;
use std::ops::Range;

/// 默认单批次最大文件数
pub const DEFAULT_MAX_BATCH_FILES: usize = 5;

/// 默认单批次最大字节数: 20MB
pub const DEFAULT_MAX_BATCH_BYTES: u64 = 20 * 1024 * 1024;

/// 批次上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub max_files: usize,
    pub max_bytes: u64,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_BATCH_FILES,
            max_bytes: DEFAULT_MAX_BATCH_BYTES,
        }
    }
}

impl From<&UploadConfig> for BatchLimits {
    fn from(config: &UploadConfig) -> Self {
        Self {
            max_files: config.max_batch_files.max(1),
            max_bytes: config.max_batch_bytes.max(1),
        }
    }
}

/// 批次中的一个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    /// 上传项 ID
    pub item_id: String,
    /// 在批次拼接负载中的字节区间
    pub range: Range<u64>,
}

impl BatchEntry {
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// 根据整批已发送字节数计算该文件的进度百分比
    ///
    /// 之前的文件读 100，之后的文件读 0
    pub fn percent_at(&self, loaded: u64) -> u8 {
        let size = self.size().max(1);
        let sent = loaded.saturating_sub(self.range.start).min(size);
        ((sent * 100) / size) as u8
    }
}

/// 上传批次
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Batch {
    /// 批次序号（从 0 开始）
    pub index: usize,
    pub entries: Vec<BatchEntry>,
}

impl Batch {
    fn new(index: usize) -> Self {
        Self {
            index,
            entries: Vec::new(),
        }
    }

    /// 批次总字节数
    pub fn total_bytes(&self) -> u64 {
        self.entries.last().map(|e| e.range.end).unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.item_id.as_str())
    }

    fn push(&mut self, item_id: String, size: u64) {
        let start = self.total_bytes();
        self.entries.push(BatchEntry {
            item_id,
            range: start..start + size,
        });
    }

    /// 只保留满足条件的文件，并重新计算字节区间
    ///
    /// 批次开始前被用户移除的上传项不再占用区间
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        let entries = std::mem::take(&mut self.entries);
        for entry in entries {
            if keep(&entry.item_id) {
                let size = entry.size();
                self.push(entry.item_id, size);
            }
        }
    }

    /// 整批已发送 `loaded` 字节时每个文件的进度
    pub fn progress_at(&self, loaded: u64) -> impl Iterator<Item = (&str, u8)> {
        self.entries
            .iter()
            .map(move |e| (e.item_id.as_str(), e.percent_at(loaded)))
    }
}

/// 规划上传批次
///
/// # 参数
/// * `items` - 按队列顺序排列的 (上传项ID, 文件大小)
/// * `limits` - 批次上限
///
/// 文件大小按至少 1 字节计
pub fn plan_batches<I, S>(items: I, limits: BatchLimits) -> Vec<Batch>
where
    I: IntoIterator<Item = (S, u64)>,
    S: Into<String>,
{
    let max_files = limits.max_files.max(1);
    let mut batches = Vec::new();
    let mut current = Batch::new(0);

    for (id, size) in items {
        let size = size.max(1);

        if !current.is_empty() {
            let would_exceed_files = current.len() + 1 > max_files;
            let would_exceed_bytes = current.total_bytes() + size > limits.max_bytes;
            if would_exceed_files || would_exceed_bytes {
                let next_index = current.index + 1;
                batches.push(std::mem::replace(&mut current, Batch::new(next_index)));
            }
        }

        current.push(id.into(), size);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
