// Photo Report Uploader Library
// 照片报告批量上传与文件夹归档核心库

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 上传引擎模块
pub mod uploader;

// 文件夹结构与已上传文件归类
pub mod folders;

// 门户接口客户端
pub mod portal;

// 报告会话
pub mod session;

// Web服务器模块
pub mod server;

// 导出常用类型
pub use config::AppConfig;
pub use folders::{FolderSchema, FolderSelection, FolderTree, GateDecision, Occupancy};
pub use portal::{PortalApi, PortalClient};
pub use server::AppState;
pub use session::{ReportSession, SessionError, SessionSnapshot};
pub use uploader::{
    BatchLimits, BatchTransport, RunOutcome, TransferError, TransferExecutor, UploadItem,
    UploadItemStatus, UploadQueue, UploadRun,
};
