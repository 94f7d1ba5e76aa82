// 报告会话
//
// 一个任务对应一个会话，负责：
// - 加载文件夹结构（失败时退化为无结构模式）
// - 每个单元的已存储文件、选中文件夹、展开状态、占用统计
// - 上传队列与预览
// - 启动 / 取消上传运行，运行结束后刷新单元文件
// - 删除已存储文件、提交报告
// - 每个关注点的当前提示
//
// 状态锁只在同步段持有，所有网络请求都在锁外进行

pub mod error;
pub mod notice;
pub mod unit;

pub use error::SessionError;
pub use notice::{Concern, Notice, NoticeBoard, NoticeKind};
pub use unit::{DestinationUnit, UnitSummary};

use crate::config::UploadConfig;
use crate::folders::{
    evaluate, files_in, ExpandState, FolderSelection, FolderTree, GateDecision, VisibleRow,
};
use crate::portal::PortalApi;
use crate::uploader::{
    inspect_file, BatchLimits, PreviewBudget, QueueSummary, RunOutcome, RunSnapshot, SharedQueue,
    TransferExecutor, UploadItem, UploadItemInfo, UploadQueue, UploadRun, UploadTarget,
    CANCELED_MESSAGE,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 会话快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub task_id: String,
    pub flat_mode: bool,
    pub active_unit: Option<String>,
    pub units: Vec<UnitSummary>,
    pub items: Vec<UploadItemInfo>,
    pub summary: QueueSummary,
    pub uploading: bool,
    pub last_run: Option<RunSnapshot>,
    pub notices: Vec<Notice>,
    pub can_submit: bool,
}

/// 文件夹行（带占用数）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRow {
    #[serde(flatten)]
    pub row: VisibleRow,
    pub file_count: usize,
    pub selected: bool,
    pub uploadable: bool,
}

/// 单元视图
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitView {
    pub unit: UnitSummary,
    pub flat_mode: bool,
    pub root_file_count: usize,
    pub orphaned: usize,
    pub rows: Vec<FolderRow>,
    pub gate: GateDecision,
}

/// 被拒绝的文件
#[derive(Debug, Clone, Serialize)]
pub struct RejectedFile {
    pub path: String,
    pub reason: String,
}

/// 添加文件结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct AddFilesReport {
    pub added: Vec<UploadItemInfo>,
    pub rejected: Vec<RejectedFile>,
}

struct SessionState {
    units: HashMap<String, DestinationUnit>,
    tree: Option<FolderTree>,
    expand: ExpandState,
    active_unit: Option<String>,
    notices: NoticeBoard,
    last_run: Option<RunSnapshot>,
}

/// 正在进行的上传运行
struct ActiveRun {
    run_id: String,
    cancel: CancellationToken,
    /// 运行结束（含收尾）后触发
    finished: CancellationToken,
}

impl ActiveRun {
    fn is_running(&self) -> bool {
        !self.finished.is_cancelled()
    }
}

/// 报告会话
pub struct ReportSession {
    task_id: String,
    unit_order: Vec<String>,
    portal: Arc<dyn PortalApi>,
    config: UploadConfig,
    state: RwLock<SessionState>,
    queue: SharedQueue,
    previews: PreviewBudget,
    active: Mutex<Option<ActiveRun>>,
}

impl ReportSession {
    pub fn new(
        task_id: impl Into<String>,
        unit_ids: Vec<String>,
        portal: Arc<dyn PortalApi>,
        config: UploadConfig,
    ) -> Arc<Self> {
        let mut unit_order: Vec<String> = Vec::with_capacity(unit_ids.len());
        for id in unit_ids {
            if !id.is_empty() && !unit_order.contains(&id) {
                unit_order.push(id);
            }
        }
        let units = unit_order
            .iter()
            .map(|id| (id.clone(), DestinationUnit::new(id.clone())))
            .collect();

        let state = SessionState {
            units,
            tree: None,
            expand: ExpandState::new(),
            active_unit: None,
            notices: NoticeBoard::new(Duration::from_secs(config.notice_ttl_secs)),
            last_run: None,
        };

        Arc::new(Self {
            task_id: task_id.into(),
            unit_order,
            portal,
            previews: PreviewBudget::new(config.preview_limit, config.preview_edge),
            config,
            state: RwLock::new(state),
            queue: Arc::new(RwLock::new(UploadQueue::new())),
            active: Mutex::new(None),
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn unit_ids(&self) -> &[String] {
        &self.unit_order
    }

    fn ensure_unit(&self, unit_id: &str) -> Result<(), SessionError> {
        if self.state.read().units.contains_key(unit_id) {
            Ok(())
        } else {
            Err(SessionError::UnknownUnit(unit_id.to_string()))
        }
    }

    // =====================================================
    // 文件夹结构
    // =====================================================

    /// 加载文件夹结构，返回是否成功
    ///
    /// 失败时退化为无结构模式并给出警告，不影响会话其他功能
    pub async fn load_schema(&self) -> bool {
        let result = self.portal.fetch_folder_schema(&self.task_id).await;

        let mut guard = self.state.write();
        let state = &mut *guard;
        let (paths, loaded) = match result {
            Ok(schema) => {
                state.notices.clear(Concern::Schema);
                (schema.resolve(), true)
            }
            Err(e) => {
                warn!("加载文件夹结构失败: task={}, error={:#}", self.task_id, e);
                state.notices.warning(
                    Concern::Schema,
                    format!("加载文件夹结构失败，已使用默认结构: {:#}", e),
                );
                (Vec::new(), false)
            }
        };

        state.tree = (!paths.is_empty()).then(|| FolderTree::build(&paths));
        state.expand.clear();
        for unit in state.units.values_mut() {
            unit.revalidate_selection(state.tree.as_ref());
            unit.recompute(state.tree.as_ref());
        }

        info!(
            "文件夹结构已加载: task={}, 节点数={}",
            self.task_id,
            state.tree.as_ref().map(FolderTree::len).unwrap_or(0)
        );
        loaded
    }

    /// 打开单元：重新加载已存储文件并重新统计
    pub async fn open_unit(&self, unit_id: &str) -> Result<UnitView, SessionError> {
        self.ensure_unit(unit_id)?;
        let result = self.portal.fetch_existing_files(&self.task_id, unit_id).await;

        {
            let mut guard = self.state.write();
            let state = &mut *guard;
            let unit = state
                .units
                .get_mut(unit_id)
                .ok_or_else(|| SessionError::UnknownUnit(unit_id.to_string()))?;

            match result {
                Ok(files) => {
                    unit.replace_files(files, state.tree.as_ref());
                    unit.loaded = true;
                }
                Err(e) => {
                    warn!("加载已上传文件失败: unit={}, error={:#}", unit_id, e);
                    unit.recompute(state.tree.as_ref());
                    state
                        .notices
                        .warning(Concern::Schema, format!("加载已上传文件失败: {:#}", e));
                }
            }
            state.active_unit = Some(unit_id.to_string());
        }

        self.unit_view(unit_id)
    }

    pub fn unit_view(&self, unit_id: &str) -> Result<UnitView, SessionError> {
        let state = self.state.read();
        let unit = state
            .units
            .get(unit_id)
            .ok_or_else(|| SessionError::UnknownUnit(unit_id.to_string()))?;
        let tree = state.tree.as_ref();

        let rows = match tree {
            Some(tree) => {
                let expanded = state.expand.expanded(unit_id, tree);
                tree.visible_rows(&expanded)
                    .into_iter()
                    .map(|row| FolderRow {
                        file_count: unit.occupancy.count_for(&row.id),
                        selected: unit.selection.node_id() == Some(row.id.as_str()),
                        uploadable: tree.is_leaf(&row.id),
                        row,
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        Ok(UnitView {
            unit: unit.summary(),
            flat_mode: tree.is_none(),
            root_file_count: unit.occupancy.root,
            orphaned: unit.occupancy.orphaned,
            rows,
            gate: evaluate(tree, &unit.selection),
        })
    }

    /// 选中文件夹（None 为根），返回闸门判定
    pub fn select_folder(
        &self,
        unit_id: &str,
        folder_id: Option<String>,
    ) -> Result<GateDecision, SessionError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let selection = FolderSelection::from(folder_id);

        if let FolderSelection::Node(id) = &selection {
            let known = state.tree.as_ref().map(|t| t.contains(id)).unwrap_or(false);
            if !known {
                return Err(SessionError::UnknownFolder(id.clone()));
            }
        }

        let unit = state
            .units
            .get_mut(unit_id)
            .ok_or_else(|| SessionError::UnknownUnit(unit_id.to_string()))?;
        unit.selection = selection;
        let decision = evaluate(state.tree.as_ref(), &unit.selection);
        state.active_unit = Some(unit_id.to_string());
        Ok(decision)
    }

    /// 切换文件夹展开状态，返回切换后的状态
    pub fn toggle_folder(&self, unit_id: &str, folder_id: &str) -> Result<bool, SessionError> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        if !state.units.contains_key(unit_id) {
            return Err(SessionError::UnknownUnit(unit_id.to_string()));
        }
        let tree = state
            .tree
            .as_ref()
            .filter(|t| t.contains(folder_id))
            .ok_or_else(|| SessionError::UnknownFolder(folder_id.to_string()))?;
        Ok(state.expand.toggle(unit_id, folder_id, tree))
    }

    /// 当前选中文件夹中的已存储文件
    pub fn files_in_selection(&self, unit_id: &str) -> Result<Vec<String>, SessionError> {
        let state = self.state.read();
        let unit = state
            .units
            .get(unit_id)
            .ok_or_else(|| SessionError::UnknownUnit(unit_id.to_string()))?;
        Ok(files_in(
            &unit.stored_files,
            &unit.id,
            state.tree.as_ref(),
            unit.selection.node_id(),
        )
        .into_iter()
        .map(str::to_string)
        .collect())
    }

    /// 删除已存储文件，返回单元剩余文件数
    ///
    /// 服务端没有返回新列表时在本地移除该 URL
    pub async fn delete_stored_file(&self, unit_id: &str, url: &str) -> Result<usize, SessionError> {
        self.ensure_unit(unit_id)?;

        match self
            .portal
            .delete_existing_file(&self.task_id, unit_id, url)
            .await
        {
            Ok(files) => {
                let mut guard = self.state.write();
                let state = &mut *guard;
                let unit = state
                    .units
                    .get_mut(unit_id)
                    .ok_or_else(|| SessionError::UnknownUnit(unit_id.to_string()))?;
                let files = files.unwrap_or_else(|| {
                    unit.stored_files
                        .iter()
                        .filter(|f| f.as_str() != url)
                        .cloned()
                        .collect()
                });
                unit.replace_files(files, state.tree.as_ref());
                let remaining = unit.file_count();
                state.notices.success(Concern::Deletion, "文件已删除");
                info!("已删除文件: unit={}, 剩余 {} 个", unit_id, remaining);
                Ok(remaining)
            }
            Err(e) => {
                let message = format!("删除文件失败: {:#}", e);
                error!("{}", message);
                self.state
                    .write()
                    .notices
                    .error(Concern::Deletion, message.clone());
                Err(SessionError::Portal(message))
            }
        }
    }

    // =====================================================
    // 上传队列
    // =====================================================

    /// 添加本地文件，被拒绝的文件只产生提示
    pub async fn add_files(&self, paths: Vec<PathBuf>) -> AddFilesReport {
        let mut report = AddFilesReport::default();

        for path in paths {
            match inspect_file(&path, &self.config).await {
                Ok(payload) => {
                    let preview = self.previews.generate(&payload.local_path).await;
                    let item = UploadItem::new(payload, preview);
                    report.added.push(UploadItemInfo::from(&item));
                    self.queue.write().push(item);
                }
                Err(e) => {
                    warn!("文件未被添加: {}", e);
                    report.rejected.push(RejectedFile {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if let Some(first) = report.rejected.first() {
            let message = format!("{} 个文件未被添加: {}", report.rejected.len(), first.reason);
            self.state.write().notices.warning(Concern::Upload, message);
        }

        report
    }

    pub fn remove_item(&self, item_id: &str) -> Result<(), SessionError> {
        self.queue.write().remove(item_id)?;
        Ok(())
    }

    /// 重新排队失败或已取消的上传项，返回新 ID
    pub fn requeue_item(&self, item_id: &str) -> Result<String, SessionError> {
        Ok(self.queue.write().requeue(item_id)?)
    }

    /// 上传项预览图（JPEG 字节与 MIME）
    pub fn preview(&self, item_id: &str) -> Result<Option<(Arc<Vec<u8>>, &'static str)>, SessionError> {
        let queue = self.queue.read();
        let item = queue
            .get(item_id)
            .ok_or_else(|| crate::uploader::ItemStateError::NotFound(item_id.to_string()))?;
        Ok(item.preview.as_ref().map(|p| (p.bytes(), p.mime())))
    }

    // =====================================================
    // 上传运行
    // =====================================================

    pub fn is_uploading(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .map(ActiveRun::is_running)
            .unwrap_or(false)
    }

    fn upload_target(&self, unit_id: Option<String>) -> Result<UploadTarget, SessionError> {
        let state = self.state.read();
        let unit_id = unit_id
            .or_else(|| state.active_unit.clone())
            .ok_or(SessionError::NoActiveUnit)?;
        let unit = state
            .units
            .get(&unit_id)
            .ok_or_else(|| SessionError::UnknownUnit(unit_id.clone()))?;
        let tree = state.tree.as_ref();

        if let GateDecision::Closed { reason } = evaluate(tree, &unit.selection) {
            return Err(SessionError::GateClosed(reason));
        }

        Ok(UploadTarget {
            task_id: self.task_id.clone(),
            unit_id,
            folder_id: tree
                .and(unit.selection.node_id())
                .map(str::to_string),
        })
    }

    /// 启动上传运行（后台执行），返回运行快照
    ///
    /// `unit_id` 为 None 时上传到当前打开的单元
    pub fn start_upload(self: &Arc<Self>, unit_id: Option<String>) -> Result<RunSnapshot, SessionError> {
        let mut active = self.active.lock();
        if active.as_ref().map(ActiveRun::is_running).unwrap_or(false) {
            return Err(SessionError::RunInProgress);
        }

        let target = match self.upload_target(unit_id) {
            Ok(target) => target,
            Err(e) => {
                if matches!(e, SessionError::GateClosed(_)) {
                    self.state.write().notices.error(Concern::Upload, e.to_string());
                }
                return Err(e);
            }
        };

        let mut run = UploadRun::plan(target, &self.queue.read(), BatchLimits::from(&self.config));
        if run.batches().is_empty() {
            return Err(SessionError::NothingToUpload);
        }

        let snapshot = run.snapshot();
        {
            let mut state = self.state.write();
            state.notices.clear(Concern::Upload);
            state.last_run = Some(snapshot.clone());
        }

        let cancel = CancellationToken::new();
        let finished = CancellationToken::new();
        let session = Arc::clone(self);
        let run_cancel = cancel.clone();
        let run_finished = finished.clone();

        info!(
            "启动上传: task={}, unit={}, run={}, 批次数={}",
            self.task_id,
            run.target.unit_id,
            run.id,
            run.batches().len()
        );

        tokio::spawn(async move {
            let executor = TransferExecutor::new(Arc::clone(&session.portal));
            executor
                .execute_with(&mut run, &session.queue, &run_cancel, |run| {
                    session.state.write().last_run = Some(run.snapshot());
                })
                .await;
            session.finish_run(run).await;
            run_finished.cancel();
        });

        *active = Some(ActiveRun {
            run_id: snapshot.id.clone(),
            cancel,
            finished,
        });
        Ok(snapshot)
    }

    /// 运行收尾：合并新文件、刷新单元、给出提示
    async fn finish_run(&self, run: UploadRun) {
        let unit_id = run.target.unit_id.clone();
        let urls = run.uploaded_urls().to_vec();

        let refreshed = if urls.is_empty() {
            None
        } else {
            match self.portal.fetch_existing_files(&self.task_id, &unit_id).await {
                Ok(files) => Some(files),
                Err(e) => {
                    warn!("上传后刷新文件列表失败，使用本地结果: {:#}", e);
                    None
                }
            }
        };

        let mut guard = self.state.write();
        let state = &mut *guard;

        if !urls.is_empty() {
            if let Some(unit) = state.units.get_mut(&unit_id) {
                let mut files = refreshed.unwrap_or_else(|| unit.stored_files.clone());
                for url in &urls {
                    if !files.contains(url) {
                        files.push(url.clone());
                    }
                }
                unit.replace_files(files, state.tree.as_ref());
            }
        }

        match run.outcome() {
            RunOutcome::Completed => state
                .notices
                .success(Concern::Upload, format!("上传完成，共 {} 个文件", urls.len())),
            RunOutcome::Failed(message) => {
                let message = if urls.is_empty() {
                    message.clone()
                } else {
                    format!("{}（此前已上传 {} 个文件）", message, urls.len())
                };
                state.notices.error(Concern::Upload, message);
            }
            RunOutcome::Canceled => state.notices.warning(Concern::Upload, CANCELED_MESSAGE),
            RunOutcome::Pending | RunOutcome::Running => {}
        }

        state.last_run = Some(run.snapshot());
    }

    /// 取消当前上传运行
    pub fn cancel_upload(&self) -> bool {
        match self.active.lock().as_ref() {
            Some(active) if active.is_running() => {
                info!("请求取消上传: run={}", active.run_id);
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// 等待当前上传运行结束
    pub async fn wait_for_run(&self) {
        let finished = self.active.lock().as_ref().map(|a| a.finished.clone());
        if let Some(finished) = finished {
            finished.cancelled().await;
        }
    }

    // =====================================================
    // 提交与提示
    // =====================================================

    /// 提交报告
    ///
    /// 只有所有单元都已上传时才会请求服务端
    pub async fn submit_report(&self) -> Result<(), SessionError> {
        if self.is_uploading() {
            return Err(SessionError::RunInProgress);
        }

        let unloaded: Vec<String> = {
            let state = self.state.read();
            state
                .units
                .values()
                .filter(|u| !u.loaded)
                .map(|u| u.id.clone())
                .collect()
        };
        for unit_id in unloaded {
            let files = match self.portal.fetch_existing_files(&self.task_id, &unit_id).await {
                Ok(files) => files,
                Err(e) => {
                    let message = format!("加载单元 {} 的已上传文件失败: {:#}", unit_id, e);
                    warn!("提交前{}", message);
                    self.state
                        .write()
                        .notices
                        .error(Concern::Submission, message.clone());
                    return Err(SessionError::Portal(message));
                }
            };
            let mut guard = self.state.write();
            let state = &mut *guard;
            if let Some(unit) = state.units.get_mut(&unit_id) {
                unit.replace_files(files, state.tree.as_ref());
                unit.loaded = true;
            }
        }

        let pending: Vec<String> = {
            let state = self.state.read();
            self.unit_order
                .iter()
                .filter(|id| !state.units.get(*id).map(|u| u.uploaded).unwrap_or(false))
                .cloned()
                .collect()
        };
        if !pending.is_empty() {
            let err = SessionError::NotAllUploaded(pending);
            self.state
                .write()
                .notices
                .error(Concern::Submission, err.to_string());
            return Err(err);
        }

        match self.portal.submit_report(&self.task_id, &self.unit_order).await {
            Ok(()) => {
                self.state
                    .write()
                    .notices
                    .success(Concern::Submission, "报告已提交");
                Ok(())
            }
            Err(e) => {
                let message = format!("提交报告失败: {:#}", e);
                error!("{}", message);
                self.state
                    .write()
                    .notices
                    .error(Concern::Submission, message.clone());
                Err(SessionError::Portal(message))
            }
        }
    }

    pub fn dismiss_notice(&self, concern: Concern) -> bool {
        self.state.write().notices.dismiss(concern)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let uploading = self.is_uploading();
        let queue = self.queue.read();
        let state = self.state.read();

        let units: Vec<UnitSummary> = self
            .unit_order
            .iter()
            .filter_map(|id| state.units.get(id).map(DestinationUnit::summary))
            .collect();
        let can_submit = !uploading && !units.is_empty() && units.iter().all(|u| u.uploaded);

        SessionSnapshot {
            task_id: self.task_id.clone(),
            flat_mode: state.tree.is_none(),
            active_unit: state.active_unit.clone(),
            units,
            items: queue.snapshot(),
            summary: queue.summary(),
            uploading,
            last_run: state.last_run.clone(),
            notices: state.notices.active(),
            can_submit,
        }
    }

    /// 关闭会话：取消上传并释放所有预览
    pub fn close(&self) {
        self.cancel_upload();
        self.queue.write().reset();
        info!(
            "会话已关闭: task={}, 剩余预览 {}",
            self.task_id,
            self.previews.live()
        );
    }
}
