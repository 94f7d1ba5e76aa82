// 批次传输执行器
//
// 一次上传运行（UploadRun）显式保存：批次规划、下一批游标、运行结果、已上传 URL。
// 执行器按顺序逐批发送：
// 1. 批次开始前检查取消
// 2. 批次内文件标记为 uploading，构建 multipart 请求
// 3. 同时等待：传输完成 / 进度上报 / 取消
// 4. 成功 → 批次内文件 done，继续下一批
//    失败 → 批次内文件 error，运行终止，后续批次保持 ready
//    取消 → 队列中所有 ready / uploading 文件标记为 canceled
//
// 队列锁只在同步段持有，不跨 await

use crate::uploader::batch::{plan_batches, Batch, BatchLimits};
use crate::uploader::item::{UploadItemStatus, CANCELED_MESSAGE};
use crate::uploader::queue::UploadQueue;
use crate::uploader::throttle::progress_channel;
use crate::uploader::transport::{BatchFile, BatchRequest, BatchTransport, TransferError, UploadTarget};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 队列共享句柄
pub type SharedQueue = Arc<RwLock<UploadQueue>>;

/// 上传运行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum RunOutcome {
    /// 尚未开始
    Pending,
    /// 进行中
    Running,
    /// 全部批次成功
    Completed,
    /// 某一批失败，运行终止
    Failed(String),
    /// 用户取消
    Canceled,
}

impl RunOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            RunOutcome::Completed | RunOutcome::Failed(_) | RunOutcome::Canceled
        )
    }
}

/// 单个批次的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Succeeded { urls: Vec<String> },
    Failed(TransferError),
    Canceled,
}

/// 一次上传运行
#[derive(Debug, Clone)]
pub struct UploadRun {
    pub id: String,
    pub target: UploadTarget,
    batches: Vec<Batch>,
    cursor: usize,
    outcome: RunOutcome,
    uploaded_urls: Vec<String>,
    pub started_at: i64,
    pub finished_at: Option<i64>,
}

/// 运行快照（对外展示）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub id: String,
    pub target: UploadTarget,
    pub total_batches: usize,
    pub completed_batches: usize,
    pub outcome: RunOutcome,
    pub uploaded_urls: Vec<String>,
    pub started_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl UploadRun {
    /// 对队列中 ready 的上传项规划批次
    pub fn plan(target: UploadTarget, queue: &UploadQueue, limits: BatchLimits) -> Self {
        let batches = plan_batches(queue.plannable(), limits);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            batches,
            cursor: 0,
            outcome: RunOutcome::Pending,
            uploaded_urls: Vec::new(),
            started_at: chrono::Utc::now().timestamp(),
            finished_at: None,
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    /// 下一个待发送批次的序号
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    pub fn uploaded_urls(&self) -> &[String] {
        &self.uploaded_urls
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_finished()
    }

    fn finish(&mut self, outcome: RunOutcome) {
        self.outcome = outcome;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            id: self.id.clone(),
            target: self.target.clone(),
            total_batches: self.batches.len(),
            completed_batches: self.cursor,
            outcome: self.outcome.clone(),
            uploaded_urls: self.uploaded_urls.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// 批次传输执行器
pub struct TransferExecutor<T: ?Sized> {
    transport: Arc<T>,
}

impl<T: BatchTransport + ?Sized> TransferExecutor<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self { transport }
    }

    /// 依次执行所有批次，直到完成、失败或取消
    pub async fn execute(
        &self,
        run: &mut UploadRun,
        queue: &SharedQueue,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        self.execute_with(run, queue, cancel, |_| {}).await
    }

    /// 同 `execute`，每个批次结束后回调一次（用于发布运行进度）
    pub async fn execute_with<F>(
        &self,
        run: &mut UploadRun,
        queue: &SharedQueue,
        cancel: &CancellationToken,
        mut after_batch: F,
    ) -> RunOutcome
    where
        F: FnMut(&UploadRun) + Send,
    {
        info!(
            "开始上传运行: run={}, unit={}, 批次数={}",
            run.id,
            run.target.unit_id,
            run.batches.len()
        );

        while self.run_next_batch(run, queue, cancel).await.is_some() {
            after_batch(run);
            if run.is_finished() {
                break;
            }
        }

        info!("上传运行结束: run={}, 结果={:?}", run.id, run.outcome);
        run.outcome.clone()
    }

    /// 执行下一个批次
    ///
    /// 运行已结束时返回 None
    pub async fn run_next_batch(
        &self,
        run: &mut UploadRun,
        queue: &SharedQueue,
        cancel: &CancellationToken,
    ) -> Option<BatchOutcome> {
        if run.is_finished() {
            return None;
        }
        if run.cursor >= run.batches.len() {
            run.finish(RunOutcome::Completed);
            return None;
        }

        if cancel.is_cancelled() {
            self.cancel_run(run, queue);
            return Some(BatchOutcome::Canceled);
        }

        run.outcome = RunOutcome::Running;
        let mut batch = run.batches[run.cursor].clone();
        let request = match prepare_batch(&mut batch, &run.target, queue) {
            Some(request) => request,
            None => {
                // 整批都已被移除
                debug!("批次#{} 没有可上传的文件，跳过", batch.index);
                self.advance(run);
                return Some(BatchOutcome::Succeeded { urls: Vec::new() });
            }
        };

        info!(
            "[批次#{}] 开始上传: {} 个文件, {} bytes",
            batch.index,
            batch.len(),
            batch.total_bytes()
        );

        let (progress_tx, mut progress_rx) = progress_channel();
        let transfer = self
            .transport
            .send_batch(request, progress_tx, cancel.clone());
        tokio::pin!(transfer);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(TransferError::Canceled),
                Some(loaded) = progress_rx.recv() => apply_progress(queue, &batch, loaded),
                result = &mut transfer => break result,
            }
        };

        // 传输结束前已发出的进度
        while let Ok(loaded) = progress_rx.try_recv() {
            apply_progress(queue, &batch, loaded);
        }

        let outcome = match result {
            Ok(urls) => {
                info!("[批次#{}] 上传成功: {} 个 URL", batch.index, urls.len());
                self.complete_batch(&batch, queue);
                run.uploaded_urls.extend(urls.iter().cloned());
                self.advance(run);
                BatchOutcome::Succeeded { urls }
            }
            Err(e) if e.is_canceled() || cancel.is_cancelled() => {
                warn!("[批次#{}] 上传被取消", batch.index);
                self.cancel_run(run, queue);
                BatchOutcome::Canceled
            }
            Err(e) => {
                error!("[批次#{}] 上传失败: {}", batch.index, e);
                self.fail_batch(&batch, queue, &e);
                run.finish(RunOutcome::Failed(e.to_string()));
                BatchOutcome::Failed(e)
            }
        };

        Some(outcome)
    }

    fn advance(&self, run: &mut UploadRun) {
        run.cursor += 1;
        if run.cursor >= run.batches.len() {
            run.finish(RunOutcome::Completed);
        }
    }

    fn complete_batch(&self, batch: &Batch, queue: &SharedQueue) {
        let mut queue = queue.write();
        for id in batch.item_ids() {
            if let Some(item) = queue.get_mut(id) {
                if let Err(e) = item.mark_done() {
                    warn!("标记完成失败: {}", e);
                }
            }
        }
    }

    fn fail_batch(&self, batch: &Batch, queue: &SharedQueue, err: &TransferError) {
        let message = err.to_string();
        let mut queue = queue.write();
        for id in batch.item_ids() {
            if let Some(item) = queue.get_mut(id) {
                if let Err(e) = item.mark_error(message.clone()) {
                    warn!("标记失败状态失败: {}", e);
                }
            }
        }
    }

    fn cancel_run(&self, run: &mut UploadRun, queue: &SharedQueue) {
        let canceled = queue.write().cancel_active(CANCELED_MESSAGE);
        info!("上传运行已取消: run={}, 取消 {} 个文件", run.id, canceled);
        run.finish(RunOutcome::Canceled);
    }
}

/// 过滤掉已被移除或不再是 ready 的上传项，标记其余为 uploading 并构建请求
fn prepare_batch(
    batch: &mut Batch,
    target: &UploadTarget,
    queue: &SharedQueue,
) -> Option<BatchRequest> {
    let mut queue = queue.write();
    batch.retain(|id| {
        queue
            .get(id)
            .map(|item| item.status() == UploadItemStatus::Ready)
            .unwrap_or(false)
    });
    if batch.is_empty() {
        return None;
    }

    let mut files = Vec::with_capacity(batch.len());
    for entry in &batch.entries {
        let item = queue.get_mut(&entry.item_id)?;
        item.mark_uploading().ok()?;
        files.push(BatchFile {
            item_id: item.id.clone(),
            payload: item.payload.clone(),
        });
    }

    Some(BatchRequest {
        target: target.clone(),
        batch_index: batch.index,
        files,
    })
}

fn apply_progress(queue: &SharedQueue, batch: &Batch, loaded: u64) {
    let mut queue = queue.write();
    for (id, percent) in batch.progress_at(loaded) {
        if let Some(item) = queue.get_mut(id) {
            item.advance_progress(percent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::item::{test_payload, UploadItem};
    use crate::uploader::throttle::ProgressSender;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const MB: u64 = 1024 * 1024;

    /// 按批次序号预设的行为
    #[derive(Clone)]
    enum Script {
        /// 依次上报进度后成功
        Succeed(Vec<u64>),
        /// 依次上报进度后失败
        Fail(Vec<u64>, TransferError),
        /// 上报进度后触发取消并挂起
        CancelMidway(Vec<u64>),
    }

    struct MockTransport {
        scripts: Vec<Script>,
        sent: Mutex<Vec<Vec<String>>>,
    }

    impl MockTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent(&self) -> Vec<Vec<String>> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl BatchTransport for MockTransport {
        async fn send_batch(
            &self,
            request: BatchRequest,
            progress: ProgressSender,
            cancel: CancellationToken,
        ) -> Result<Vec<String>, TransferError> {
            let call = {
                let mut sent = self.sent.lock();
                sent.push(request.files.iter().map(|f| f.item_id.clone()).collect());
                sent.len() - 1
            };
            let script = self
                .scripts
                .get(call)
                .cloned()
                .unwrap_or(Script::Succeed(Vec::new()));

            match script {
                Script::Succeed(ticks) => {
                    for t in ticks {
                        let _ = progress.send(t);
                    }
                    Ok(request
                        .files
                        .iter()
                        .map(|f| format!("https://cdn.example.com/{}", f.payload.file_name))
                        .collect())
                }
                Script::Fail(ticks, err) => {
                    for t in ticks {
                        let _ = progress.send(t);
                    }
                    Err(err)
                }
                Script::CancelMidway(ticks) => {
                    for t in ticks {
                        let _ = progress.send(t);
                    }
                    tokio::task::yield_now().await;
                    cancel.cancel();
                    std::future::pending().await
                }
            }
        }
    }

    fn target() -> UploadTarget {
        UploadTarget {
            task_id: "t1".to_string(),
            unit_id: "u1".to_string(),
            folder_id: Some("f1".to_string()),
        }
    }

    fn shared_queue(sizes: &[u64]) -> (SharedQueue, Vec<String>) {
        let mut queue = UploadQueue::new();
        let ids = sizes
            .iter()
            .enumerate()
            .map(|(i, size)| queue.push(UploadItem::new(test_payload(&format!("p{}.jpg", i), *size), None)))
            .collect();
        (Arc::new(RwLock::new(queue)), ids)
    }

    fn status_of(queue: &SharedQueue, id: &str) -> UploadItemStatus {
        queue.read().get(id).unwrap().status()
    }

    #[tokio::test]
    async fn test_all_batches_succeed() {
        let (queue, ids) = shared_queue(&[4 * MB; 7]);
        let transport = MockTransport::new(vec![]);
        let executor = TransferExecutor::new(transport.clone());

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        assert_eq!(run.batches().len(), 2);

        let outcome = executor
            .execute(&mut run, &queue, &CancellationToken::new())
            .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(run.uploaded_urls().len(), 7);
        assert_eq!(run.cursor(), 2);
        let sent = transport.sent();
        assert_eq!(sent[0], ids[..5].to_vec());
        assert_eq!(sent[1], ids[5..].to_vec());
        for id in &ids {
            assert_eq!(status_of(&queue, id), UploadItemStatus::Done);
            assert_eq!(queue.read().get(id).unwrap().progress(), 100);
        }
    }

    #[tokio::test]
    async fn test_after_batch_sees_each_completed_batch() {
        let (queue, _) = shared_queue(&[4 * MB; 7]);
        let executor = TransferExecutor::new(MockTransport::new(vec![]));

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        let mut seen = Vec::new();
        let outcome = executor
            .execute_with(&mut run, &queue, &CancellationToken::new(), |run| {
                seen.push((run.snapshot().completed_batches, run.uploaded_urls().len()))
            })
            .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(seen, vec![(1, 5), (2, 7)]);
    }

    #[tokio::test]
    async fn test_failure_halts_remaining_batches() {
        let (queue, ids) = shared_queue(&[MB; 3]);
        let limits = BatchLimits {
            max_files: 1,
            max_bytes: 20 * MB,
        };
        let transport = MockTransport::new(vec![
            Script::Succeed(vec![]),
            Script::Fail(vec![], TransferError::Network("连接被重置".to_string())),
        ]);
        let executor = TransferExecutor::new(transport.clone());

        let mut run = UploadRun::plan(target(), &queue.read(), limits);
        let outcome = executor
            .execute(&mut run, &queue, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, RunOutcome::Failed(ref m) if m.contains("连接被重置")));
        assert_eq!(transport.sent().len(), 2);
        assert_eq!(status_of(&queue, &ids[0]), UploadItemStatus::Done);
        assert_eq!(status_of(&queue, &ids[1]), UploadItemStatus::Error);
        assert_eq!(status_of(&queue, &ids[2]), UploadItemStatus::Ready);
        assert_eq!(run.uploaded_urls().len(), 1);
    }

    #[tokio::test]
    async fn test_read_only_error_message_is_distinct() {
        let (queue, ids) = shared_queue(&[MB]);
        let transport = MockTransport::new(vec![Script::Fail(vec![], TransferError::ReadOnlyStorage)]);
        let executor = TransferExecutor::new(transport);

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        let outcome = executor
            .execute(&mut run, &queue, &CancellationToken::new())
            .await;

        let expected = TransferError::ReadOnlyStorage.to_string();
        assert_eq!(outcome, RunOutcome::Failed(expected.clone()));
        assert_eq!(queue.read().get(&ids[0]).unwrap().error(), Some(expected.as_str()));
    }

    #[tokio::test]
    async fn test_cancel_mid_transfer() {
        let (queue, ids) = shared_queue(&[4 * MB; 7]);
        let transport = MockTransport::new(vec![Script::CancelMidway(vec![2 * MB])]);
        let executor = TransferExecutor::new(transport.clone());
        let cancel = CancellationToken::new();

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        let outcome = executor.execute(&mut run, &queue, &cancel).await;

        assert_eq!(outcome, RunOutcome::Canceled);
        assert_eq!(transport.sent().len(), 1);
        assert!(run.uploaded_urls().is_empty());
        for id in &ids {
            let queue = queue.read();
            let item = queue.get(id).unwrap();
            assert_eq!(item.status(), UploadItemStatus::Canceled);
            assert_eq!(item.error(), Some(CANCELED_MESSAGE));
        }
        // 取消之后不再有任何状态变化
        assert!(executor.run_next_batch(&mut run, &queue, &cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (queue, ids) = shared_queue(&[MB, MB]);
        let transport = MockTransport::new(vec![]);
        let executor = TransferExecutor::new(transport.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        let outcome = executor.execute(&mut run, &queue, &cancel).await;

        assert_eq!(outcome, RunOutcome::Canceled);
        assert!(transport.sent().is_empty());
        assert_eq!(status_of(&queue, &ids[0]), UploadItemStatus::Canceled);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let (queue, ids) = shared_queue(&[100, 100]);
        let transport = MockTransport::new(vec![Script::Fail(
            vec![150, 50],
            TransferError::Status {
                status: 500,
                message: "内部错误".to_string(),
            },
        )]);
        let executor = TransferExecutor::new(transport);

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        executor
            .execute(&mut run, &queue, &CancellationToken::new())
            .await;

        let queue = queue.read();
        assert_eq!(queue.get(&ids[0]).unwrap().progress(), 100);
        assert_eq!(queue.get(&ids[1]).unwrap().progress(), 50);
        assert_eq!(queue.get(&ids[1]).unwrap().status(), UploadItemStatus::Error);
    }

    #[tokio::test]
    async fn test_removed_items_are_skipped() {
        let (queue, ids) = shared_queue(&[MB, MB, MB]);
        let transport = MockTransport::new(vec![]);
        let executor = TransferExecutor::new(transport.clone());

        let mut run = UploadRun::plan(target(), &queue.read(), BatchLimits::default());
        queue.write().remove(&ids[1]).unwrap();

        let outcome = executor
            .execute(&mut run, &queue, &CancellationToken::new())
            .await;

        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(transport.sent()[0], vec![ids[0].clone(), ids[2].clone()]);
        assert_eq!(run.uploaded_urls().len(), 2);
    }
}
