// 上传引擎模块
//
// - item: 上传项状态机
// - batch: 批次规划（文件数 / 字节数上限）
// - executor: 逐批传输、进度换算、协作式取消
// - queue: 上传队列
// - intake / preview: 选择阶段校验与预览图
// - throttle / transport: 进度节流与传输接口

pub mod batch;
pub mod executor;
pub mod intake;
pub mod item;
pub mod preview;
pub mod queue;
pub mod throttle;
pub mod transport;

pub use batch::{plan_batches, Batch, BatchEntry, BatchLimits};
pub use executor::{BatchOutcome, RunOutcome, RunSnapshot, SharedQueue, TransferExecutor, UploadRun};
pub use intake::{inspect_file, IntakeError};
pub use item::{
    FilePayload, ItemStateError, UploadItem, UploadItemInfo, UploadItemStatus, CANCELED_MESSAGE,
};
pub use preview::{PreviewBudget, PreviewHandle};
pub use queue::{QueueSummary, UploadQueue};
pub use throttle::{progress_channel, ProgressReporter, ProgressSender, ProgressThrottler};
pub use transport::{BatchFile, BatchRequest, BatchTransport, TransferError, UploadTarget};
