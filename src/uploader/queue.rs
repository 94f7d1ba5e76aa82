// 上传队列
//
// 按添加顺序保存上传项，是增删上传项的唯一入口。
// 运行期间只有传输执行器修改状态和进度

use crate::uploader::item::{
    FilePayload, ItemStateError, UploadItem, UploadItemInfo, UploadItemStatus,
};
use serde::Serialize;
use tracing::debug;

/// 队列统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSummary {
    pub total: usize,
    pub ready: usize,
    pub uploading: usize,
    pub done: usize,
    pub error: usize,
    pub canceled: usize,
}

/// 上传队列
#[derive(Debug, Default)]
pub struct UploadQueue {
    items: Vec<UploadItem>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 添加上传项，返回其 ID
    pub fn push(&mut self, item: UploadItem) -> String {
        let id = item.id.clone();
        debug!("加入上传队列: id={}, size={}", id, item.payload.size);
        self.items.push(item);
        id
    }

    pub fn get(&self, id: &str) -> Option<&UploadItem> {
        self.items.iter().find(|i| i.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadItem> {
        self.items.iter()
    }

    /// 移除上传项（上传中的不可移除），预览随上传项一起释放
    pub fn remove(&mut self, id: &str) -> Result<UploadItem, ItemStateError> {
        let pos = self
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| ItemStateError::NotFound(id.to_string()))?;

        if !self.items[pos].status().is_removable() {
            return Err(ItemStateError::Busy(id.to_string()));
        }

        Ok(self.items.remove(pos))
    }

    /// 重新排队失败/取消的上传项
    ///
    /// 等价于移除后重新添加：生成新 ID，回到 ready，排到队尾
    pub fn requeue(&mut self, id: &str) -> Result<String, ItemStateError> {
        let status = self
            .get(id)
            .map(|i| i.status())
            .ok_or_else(|| ItemStateError::NotFound(id.to_string()))?;

        if !matches!(status, UploadItemStatus::Error | UploadItemStatus::Canceled) {
            return Err(ItemStateError::IllegalTransition {
                id: id.to_string(),
                from: status,
                to: UploadItemStatus::Ready,
            });
        }

        let old = self.remove(id)?;
        let payload: FilePayload = old.payload;
        let item = UploadItem::new(payload, old.preview);
        Ok(self.push(item))
    }

    /// 清空队列（释放全部预览）
    pub fn reset(&mut self) {
        self.items.clear();
    }

    /// 可参与批次规划的上传项 (ID, 字节数)，按队列顺序
    ///
    /// 只有 ready 状态的上传项：失败/取消为终态，需要重新排队
    pub fn plannable(&self) -> Vec<(String, u64)> {
        self.items
            .iter()
            .filter(|i| i.status() == UploadItemStatus::Ready)
            .map(|i| (i.id.clone(), i.payload.planned_size()))
            .collect()
    }

    /// 是否有上传中的项
    pub fn has_uploading(&self) -> bool {
        self.items
            .iter()
            .any(|i| i.status() == UploadItemStatus::Uploading)
    }

    /// 把所有 ready / uploading 的上传项标记为取消，返回数量
    pub fn cancel_active(&mut self, message: &str) -> usize {
        self.items
            .iter_mut()
            .filter(|i| matches!(i.status(), UploadItemStatus::Ready | UploadItemStatus::Uploading))
            .filter_map(|i| i.mark_canceled(message).ok())
            .count()
    }

    pub fn summary(&self) -> QueueSummary {
        let mut summary = QueueSummary {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status() {
                UploadItemStatus::Ready => summary.ready += 1,
                UploadItemStatus::Uploading => summary.uploading += 1,
                UploadItemStatus::Done => summary.done += 1,
                UploadItemStatus::Error => summary.error += 1,
                UploadItemStatus::Canceled => summary.canceled += 1,
            }
        }
        summary
    }

    pub fn snapshot(&self) -> Vec<UploadItemInfo> {
        self.items.iter().map(UploadItemInfo::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::item::{test_payload, CANCELED_MESSAGE};
    use crate::uploader::preview::PreviewBudget;

    fn queue_with(names: &[&str]) -> (UploadQueue, Vec<String>) {
        let mut queue = UploadQueue::new();
        let ids = names
            .iter()
            .map(|n| queue.push(UploadItem::new(test_payload(n, 10), None)))
            .collect();
        (queue, ids)
    }

    #[test]
    fn test_remove_refuses_uploading() {
        let (mut queue, ids) = queue_with(&["a.jpg", "b.jpg"]);
        queue.get_mut(&ids[0]).unwrap().mark_uploading().unwrap();

        assert_eq!(
            queue.remove(&ids[0]).unwrap_err(),
            ItemStateError::Busy(ids[0].clone())
        );
        assert!(queue.remove(&ids[1]).is_ok());
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            queue.remove("missing"),
            Err(ItemStateError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_releases_preview() {
        let budget = PreviewBudget::new(1, 32);
        let mut queue = UploadQueue::new();
        let id = queue.push(UploadItem::new(
            test_payload("a.jpg", 10),
            budget.from_encoded(vec![0xff]),
        ));
        assert_eq!(budget.live(), 1);

        queue.remove(&id).unwrap();
        assert_eq!(budget.live(), 0);

        queue.push(UploadItem::new(
            test_payload("b.jpg", 10),
            budget.from_encoded(vec![0xff]),
        ));
        queue.reset();
        assert_eq!(budget.live(), 0);
    }

    #[test]
    fn test_plannable_only_ready() {
        let (mut queue, ids) = queue_with(&["a.jpg", "b.jpg", "c.jpg"]);
        let a = queue.get_mut(&ids[0]).unwrap();
        a.mark_uploading().unwrap();
        a.mark_done().unwrap();
        let b = queue.get_mut(&ids[1]).unwrap();
        b.mark_uploading().unwrap();
        b.mark_error("boom").unwrap();

        let plannable = queue.plannable();
        assert_eq!(plannable, vec![(ids[2].clone(), 10)]);
    }

    #[test]
    fn test_requeue_failed_item() {
        let (mut queue, ids) = queue_with(&["a.jpg", "b.jpg"]);
        let a = queue.get_mut(&ids[0]).unwrap();
        a.mark_uploading().unwrap();
        a.mark_error("boom").unwrap();

        let new_id = queue.requeue(&ids[0]).unwrap();
        assert_ne!(new_id, ids[0]);
        assert!(queue.get(&ids[0]).is_none());
        let requeued = queue.get(&new_id).unwrap();
        assert_eq!(requeued.status(), UploadItemStatus::Ready);
        assert_eq!(requeued.payload.file_name, "a.jpg");
        // 排到队尾
        assert_eq!(queue.iter().last().unwrap().id, new_id);

        // ready 状态不能重新排队
        assert!(queue.requeue(&ids[1]).is_err());
    }

    #[test]
    fn test_cancel_active_skips_terminal() {
        let (mut queue, ids) = queue_with(&["a.jpg", "b.jpg", "c.jpg"]);
        let a = queue.get_mut(&ids[0]).unwrap();
        a.mark_uploading().unwrap();
        a.mark_done().unwrap();
        queue.get_mut(&ids[1]).unwrap().mark_uploading().unwrap();

        assert_eq!(queue.cancel_active(CANCELED_MESSAGE), 2);
        let summary = queue.summary();
        assert_eq!(summary.done, 1);
        assert_eq!(summary.canceled, 2);
        assert!(!queue.has_uploading());
    }
}
