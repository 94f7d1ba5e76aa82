// 上传闸门
//
// 没有自定义结构时总是允许；有结构时只允许上传到已选中的叶子节点

use crate::folders::tree::FolderTree;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 当前选中的文件夹
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum FolderSelection {
    #[default]
    Root,
    Node(String),
}

impl FolderSelection {
    pub fn node_id(&self) -> Option<&str> {
        match self {
            FolderSelection::Root => None,
            FolderSelection::Node(id) => Some(id),
        }
    }
}

impl From<Option<String>> for FolderSelection {
    fn from(id: Option<String>) -> Self {
        match id {
            Some(id) if !id.is_empty() => FolderSelection::Node(id),
            _ => FolderSelection::Root,
        }
    }
}

/// 拒绝原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum GateReason {
    /// 有自定义结构时不能上传到根目录
    RootNotAllowed,
    /// 选中的节点还有子文件夹
    HasChildren(usize),
    /// 选中的节点不在当前结构中
    UnknownNode(String),
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::RootNotAllowed => write!(f, "请先选择要上传到的文件夹"),
            GateReason::HasChildren(n) => {
                write!(f, "该文件夹包含 {} 个子文件夹，请选择最底层的文件夹", n)
            }
            GateReason::UnknownNode(id) => write!(f, "文件夹不存在: {}", id),
        }
    }
}

/// 闸门判定
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum GateDecision {
    Open,
    Closed { reason: GateReason },
}

impl GateDecision {
    pub fn is_open(&self) -> bool {
        matches!(self, GateDecision::Open)
    }
}

/// 判断当前选择是否允许上传
pub fn evaluate(tree: Option<&FolderTree>, selection: &FolderSelection) -> GateDecision {
    let tree = match tree {
        Some(tree) if !tree.is_empty() => tree,
        _ => return GateDecision::Open,
    };

    let reason = match selection {
        FolderSelection::Root => GateReason::RootNotAllowed,
        FolderSelection::Node(id) if !tree.contains(id) => GateReason::UnknownNode(id.clone()),
        FolderSelection::Node(id) => match tree.descendant_count(id) {
            0 => return GateDecision::Open,
            n => GateReason::HasChildren(n),
        },
    };

    GateDecision::Closed { reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folders::schema::FolderPath;

    fn tree() -> FolderTree {
        FolderTree::build(&[
            FolderPath { id: "docs".into(), path: "Docs".into() },
            FolderPath { id: "scans".into(), path: "Docs/Scans".into() },
            FolderPath { id: "photos".into(), path: "Photos".into() },
        ])
    }

    fn node(id: &str) -> FolderSelection {
        FolderSelection::Node(id.to_string())
    }

    #[test]
    fn test_flat_mode_always_open() {
        assert!(evaluate(None, &FolderSelection::Root).is_open());
        assert!(evaluate(Some(&FolderTree::default()), &FolderSelection::Root).is_open());
        assert!(evaluate(None, &node("anything")).is_open());
    }

    #[test]
    fn test_schema_mode() {
        let tree = tree();
        assert_eq!(
            evaluate(Some(&tree), &FolderSelection::Root),
            GateDecision::Closed {
                reason: GateReason::RootNotAllowed
            }
        );
        assert_eq!(
            evaluate(Some(&tree), &node("docs")),
            GateDecision::Closed {
                reason: GateReason::HasChildren(1)
            }
        );
        assert!(evaluate(Some(&tree), &node("scans")).is_open());
        assert!(evaluate(Some(&tree), &node("photos")).is_open());
        assert!(matches!(
            evaluate(Some(&tree), &node("gone")),
            GateDecision::Closed {
                reason: GateReason::UnknownNode(_)
            }
        ));
    }

    #[test]
    fn test_selection_from_option() {
        assert_eq!(FolderSelection::from(None), FolderSelection::Root);
        assert_eq!(FolderSelection::from(Some(String::new())), FolderSelection::Root);
        assert_eq!(FolderSelection::from(Some("x".to_string())).node_id(), Some("x"));
    }
}
