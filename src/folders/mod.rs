// 文件夹结构模块
//
// schema 解析服务端的自定义结构，tree 构建导航树，
// classifier 把已存储文件归类到节点，gate 决定能否上传到选中节点

pub mod classifier;
pub mod expand;
pub mod gate;
pub mod schema;
pub mod tree;

pub use classifier::{files_in, folder_key_of, FolderKey, Occupancy, Placement};
pub use expand::ExpandState;
pub use gate::{evaluate, FolderSelection, GateDecision, GateReason};
pub use schema::{FolderPath, FolderSchema, FolderSchemaResponse, SchemaNode};
pub use tree::{FolderTree, TreeNode, VisibleRow};
