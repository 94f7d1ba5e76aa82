// 每个单元的展开状态
//
// None 表示尚未自定义，按"全部展开"计算；
// Some（即使为空）表示用户已调整过，在会话内保持

use crate::folders::tree::FolderTree;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Default)]
pub struct ExpandState {
    units: HashMap<String, Option<HashSet<String>>>,
}

impl ExpandState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单元是否已被用户自定义
    pub fn is_customized(&self, unit_id: &str) -> bool {
        matches!(self.units.get(unit_id), Some(Some(_)))
    }

    /// 当前展开的节点集合
    pub fn expanded(&self, unit_id: &str, tree: &FolderTree) -> HashSet<String> {
        match self.units.get(unit_id) {
            Some(Some(set)) => set.clone(),
            _ => all_nodes(tree),
        }
    }

    pub fn is_expanded(&self, unit_id: &str, node_id: &str) -> bool {
        match self.units.get(unit_id) {
            Some(Some(set)) => set.contains(node_id),
            _ => true,
        }
    }

    /// 切换节点展开状态，返回切换后的状态
    pub fn toggle(&mut self, unit_id: &str, node_id: &str, tree: &FolderTree) -> bool {
        let set = self.materialize(unit_id, tree);
        if set.remove(node_id) {
            false
        } else {
            set.insert(node_id.to_string());
            true
        }
    }

    pub fn set_expanded(&mut self, unit_id: &str, node_id: &str, expanded: bool, tree: &FolderTree) {
        let set = self.materialize(unit_id, tree);
        if expanded {
            set.insert(node_id.to_string());
        } else {
            set.remove(node_id);
        }
    }

    /// 结构重新加载后所有单元恢复默认
    pub fn clear(&mut self) {
        self.units.clear();
    }

    fn materialize(&mut self, unit_id: &str, tree: &FolderTree) -> &mut HashSet<String> {
        self.units
            .entry(unit_id.to_string())
            .or_insert(None)
            .get_or_insert_with(|| all_nodes(tree))
    }
}

fn all_nodes(tree: &FolderTree) -> HashSet<String> {
    tree.node_ids().map(str::to_string).collect()
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

    #[test]
    fn test_defaults_to_all_expanded() {
        let state = ExpandState::new();
        let tree = tree();
        assert_eq!(state.expanded("BS-1", &tree).len(), 3);
        assert!(state.is_expanded("BS-1", "docs"));
        assert!(!state.is_customized("BS-1"));
    }

    #[test]
    fn test_toggle_is_per_unit() {
        let mut state = ExpandState::new();
        let tree = tree();

        assert!(!state.toggle("BS-1", "docs", &tree));
        assert!(state.is_customized("BS-1"));
        assert!(!state.expanded("BS-1", &tree).contains("docs"));
        assert!(state.expanded("BS-2", &tree).contains("docs"));

        assert!(state.toggle("BS-1", "docs", &tree));
        assert!(state.is_expanded("BS-1", "docs"));
    }

    #[test]
    fn test_empty_customization_is_preserved() {
        let mut state = ExpandState::new();
        let tree = tree();
        for id in ["docs", "scans", "photos"] {
            state.set_expanded("BS-1", id, false, &tree);
        }
        // 空集合也算已自定义，不回到默认
        assert!(state.expanded("BS-1", &tree).is_empty());
        assert!(state.is_customized("BS-1"));

        state.clear();
        assert_eq!(state.expanded("BS-1", &tree).len(), 3);
    }
}
