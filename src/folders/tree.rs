// 文件夹树
//
// 由 {id, path} 列表构建森林：
// - 父节点 = 路径去掉最后一段后对应的节点
// - 父路径为空或不在结构中的节点挂在根下
// - 同一父节点下的子节点按名称排序（Unicode 排序规则，根区域）

use crate::folders::classifier::normalize_folder_path;
use crate::folders::schema::{split_segments, FolderPath};
use icu_collator::{Collator, CollatorOptions, Strength};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// 树节点
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    /// 显示名称（路径最后一段）
    pub name: String,
    /// 完整路径
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// 可见行（按展开状态展开后的树）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibleRow {
    pub id: String,
    pub name: String,
    pub path: String,
    pub depth: usize,
    pub has_children: bool,
    pub expanded: bool,
}

/// 文件夹树
#[derive(Debug, Clone, Default)]
pub struct FolderTree {
    nodes: HashMap<String, TreeNode>,
    /// 完整路径 → 节点 ID
    by_path: HashMap<String, String>,
    /// 规范化路径 → 节点 ID（与存储 key 比较）
    by_key: HashMap<String, String>,
    roots: Vec<String>,
    children: HashMap<String, Vec<String>>,
}

thread_local! {
    /// 根区域、三级强度的排序器（小写在前）
    static NAME_COLLATOR: Option<Collator> = {
        let mut options = CollatorOptions::new();
        options.strength = Some(Strength::Tertiary);
        match Collator::try_new(&Default::default(), options) {
            Ok(collator) => Some(collator),
            Err(e) => {
                warn!("创建排序器失败，按忽略大小写排序: {}", e);
                None
            }
        }
    };
}

/// 名称比较：按 Unicode 排序规则，相等时按原始字符串
pub fn compare_names(a: &str, b: &str) -> Ordering {
    NAME_COLLATOR
        .with(|collator| match collator {
            Some(collator) => collator.compare(a, b),
            None => a.to_lowercase().cmp(&b.to_lowercase()),
        })
        .then_with(|| a.cmp(b))
}

impl FolderTree {
    pub fn build(paths: &[FolderPath]) -> Self {
        let mut tree = FolderTree::default();
        let mut order: Vec<(String, Vec<String>)> = Vec::new();

        for fp in paths {
            let segments: Vec<String> = split_segments(&fp.path).map(str::to_string).collect();
            let Some(name) = segments.last().cloned() else {
                continue;
            };
            let path = segments.join("/");

            if tree.nodes.contains_key(&fp.id) || tree.by_path.contains_key(&path) {
                debug!("忽略重复的文件夹: id={}, path={}", fp.id, path);
                continue;
            }

            tree.by_path.insert(path.clone(), fp.id.clone());
            tree.by_key
                .entry(normalize_folder_path(&path))
                .or_insert_with(|| fp.id.clone());
            tree.nodes.insert(
                fp.id.clone(),
                TreeNode {
                    id: fp.id.clone(),
                    name,
                    path,
                    parent_id: None,
                },
            );
            order.push((fp.id.clone(), segments));
        }

        for (id, segments) in order {
            let parent_path = segments[..segments.len() - 1].join("/");
            let parent = if parent_path.is_empty() {
                None
            } else {
                tree.by_path.get(&parent_path).cloned()
            };

            match parent {
                Some(parent_id) => {
                    tree.children.entry(parent_id.clone()).or_default().push(id.clone());
                    if let Some(node) = tree.nodes.get_mut(&id) {
                        node.parent_id = Some(parent_id);
                    }
                }
                None => tree.roots.push(id),
            }
        }

        let nodes = &tree.nodes;
        let by_name = |a: &String, b: &String| compare_names(&nodes[a].name, &nodes[b].name);
        tree.roots.sort_by(by_name);
        for list in tree.children.values_mut() {
            list.sort_by(by_name);
        }

        tree
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: &str) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn path_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|n| n.path.as_str())
    }

    pub fn id_for_path(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    /// 按规范化路径查找节点
    pub fn id_for_key(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(String::as_str)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// 子节点（已排序），`None` 表示根
    pub fn children(&self, id: Option<&str>) -> &[String] {
        match id {
            None => &self.roots,
            Some(id) => self.children.get(id).map(Vec::as_slice).unwrap_or(&[]),
        }
    }

    /// 后代节点数量
    pub fn descendant_count(&self, id: &str) -> usize {
        let mut count = 0;
        let mut stack: Vec<&str> = self.children(Some(id)).iter().map(String::as_str).collect();
        while let Some(next) = stack.pop() {
            count += 1;
            stack.extend(self.children(Some(next)).iter().map(String::as_str));
        }
        count
    }

    pub fn is_leaf(&self, id: &str) -> bool {
        self.children(Some(id)).is_empty()
    }

    /// 沿父链重新拼出节点路径
    pub fn derived_path(&self, id: &str) -> String {
        let mut names = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.nodes.get(id);
        while let Some(node) = current {
            if !visited.insert(node.id.as_str()) {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent_id.as_deref().and_then(|p| self.nodes.get(p));
        }
        names.reverse();
        names.join("/")
    }

    /// 按展开状态展开为可见行（深度优先，子节点有序）
    pub fn visible_rows(&self, expanded: &HashSet<String>) -> Vec<VisibleRow> {
        let mut rows = Vec::new();
        let mut stack: Vec<(&str, usize)> = self.roots.iter().rev().map(|id| (id.as_str(), 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            let children = self.children(Some(id));
            let is_expanded = !children.is_empty() && expanded.contains(id);

            rows.push(VisibleRow {
                id: node.id.clone(),
                name: node.name.clone(),
                path: node.path.clone(),
                depth,
                has_children: !children.is_empty(),
                expanded: is_expanded,
            });

            if is_expanded {
                stack.extend(children.iter().rev().map(|c| (c.as_str(), depth + 1)));
            }
        }

        rows
    }
}
