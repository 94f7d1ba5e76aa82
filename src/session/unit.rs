// 上传目标单元

use crate::folders::{FolderSelection, FolderTree, Occupancy};
use serde::Serialize;

/// 上传目标单元（站点等）
#[derive(Debug, Clone)]
pub struct DestinationUnit {
    pub id: String,
    /// 是否已有上传的文件
    pub uploaded: bool,
    /// 已存储文件的 URL
    pub stored_files: Vec<String>,
    pub selection: FolderSelection,
    pub occupancy: Occupancy,
    /// 是否已从服务端加载过文件列表
    pub loaded: bool,
}

impl DestinationUnit {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            uploaded: false,
            stored_files: Vec::new(),
            selection: FolderSelection::Root,
            occupancy: Occupancy::default(),
            loaded: false,
        }
    }

    pub fn file_count(&self) -> usize {
        self.stored_files.len()
    }

    /// 替换已存储文件列表并重新统计
    pub fn replace_files(&mut self, files: Vec<String>, tree: Option<&FolderTree>) {
        self.stored_files = files;
        self.uploaded = !self.stored_files.is_empty();
        self.recompute(tree);
    }

    pub fn recompute(&mut self, tree: Option<&FolderTree>) {
        self.occupancy = Occupancy::compute(&self.stored_files, &self.id, tree);
    }

    /// 结构变化后，选中的节点不存在时回到根
    pub fn revalidate_selection(&mut self, tree: Option<&FolderTree>) {
        if let FolderSelection::Node(id) = &self.selection {
            if !tree.map(|t| t.contains(id)).unwrap_or(false) {
                self.selection = FolderSelection::Root;
            }
        }
    }

    pub fn summary(&self) -> UnitSummary {
        UnitSummary {
            id: self.id.clone(),
            uploaded: self.uploaded,
            file_count: self.file_count(),
            selection: self.selection.clone(),
        }
    }
}

/// 单元概要
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummary {
    pub id: String,
    pub uploaded: bool,
    pub file_count: usize,
    pub selection: FolderSelection,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::folders::FolderPath;

    #[test]
    fn test_replace_files_updates_flag_and_occupancy() {
        let tree = FolderTree::build(&[FolderPath {
            id: "docs".into(),
            path: "Docs".into(),
        }]);
        let mut unit = DestinationUnit::new("BS-1");

        unit.replace_files(
            vec![
                "https://s.example.com/BS-1/Docs/a.jpg".into(),
                "https://s.example.com/BS-1/b.jpg".into(),
            ],
            Some(&tree),
        );
        assert!(unit.uploaded);
        assert_eq!(unit.occupancy.count_for("docs"), 1);
        assert_eq!(unit.occupancy.root, 1);

        unit.replace_files(Vec::new(), Some(&tree));
        assert!(!unit.uploaded);
        assert_eq!(unit.occupancy.attributed(), 0);
    }

    #[test]
    fn test_selection_falls_back_to_root() {
        let mut unit = DestinationUnit::new("BS-1");
        unit.selection = FolderSelection::Node("gone".into());
        unit.revalidate_selection(None);
        assert_eq!(unit.selection, FolderSelection::Root);
    }
}
