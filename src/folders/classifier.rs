// 已存储文件归类
//
// 存储 URL 形如 https://host/.../units/{unitId}/{folder...}/{file}
// 1. 取出存储 key（绝对 URL 去掉协议与主机，相对路径去掉开头的 /）
// 2. 按 / 切分并逐段 percent-decode
// 3. 找到与单元 ID 相同的段，之后到文件名之前的部分为文件夹路径
// 4. 逐段规范化后重新拼接，与文件夹树中的路径比较
//
// 不含单元 ID 的 URL 不归属任何节点，也不计入任何数量

use crate::folders::schema::split_segments;
use crate::folders::tree::FolderTree;
use serde::Serialize;
use std::collections::HashMap;

/// 从 URL 中取出存储 key
pub fn extract_storage_key(url: &str) -> String {
    let url = url.trim();
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if parsed.has_host() {
            return parsed.path().trim_start_matches('/').to_string();
        }
    }

    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].trim_start_matches('/').to_string()
}

/// 规范化单个路径段：路径分隔符与空白替换为 `_`
pub fn normalize_segment(segment: &str) -> String {
    segment
        .trim()
        .chars()
        .map(|c| if c == '/' || c == '\\' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// 规范化文件夹路径（逐段规范化，去掉空段）
pub fn normalize_folder_path(path: &str) -> String {
    split_segments(path)
        .map(normalize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_segment(segment: &str) -> String {
    urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string())
}

/// 文件在单元内的位置
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum FolderKey {
    /// 直接位于单元根目录
    Root,
    /// 位于某个文件夹（规范化路径）
    Folder(String),
}

/// 推断文件所在的文件夹
///
/// URL 中不含单元 ID，或单元 ID 之后没有文件名时返回 None
pub fn folder_key_of(url: &str, unit_id: &str) -> Option<FolderKey> {
    let key = extract_storage_key(url);
    let segments: Vec<String> = key
        .split('/')
        .filter(|s| !s.is_empty())
        .map(decode_segment)
        .collect();

    let unit_pos = segments.iter().position(|s| s == unit_id)?;
    let rest = &segments[unit_pos + 1..];
    let (_file_name, folders) = rest.split_last()?;

    let normalized: Vec<String> = folders
        .iter()
        .map(|s| normalize_segment(s))
        .filter(|s| !s.is_empty())
        .collect();

    if normalized.is_empty() {
        Some(FolderKey::Root)
    } else {
        Some(FolderKey::Folder(normalized.join("/")))
    }
}

/// 归类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Root,
    Node(String),
    /// 文件夹不在当前结构中
    Orphaned(String),
    /// 无法归属到该单元
    Unattributed,
}

/// 结合文件夹树归类单个文件
///
/// 没有自定义结构时所有可归属的文件都计入根目录
pub fn place(url: &str, unit_id: &str, tree: Option<&FolderTree>) -> Placement {
    let tree = tree.filter(|t| !t.is_empty());
    match (folder_key_of(url, unit_id), tree) {
        (None, _) => Placement::Unattributed,
        (Some(_), None) | (Some(FolderKey::Root), Some(_)) => Placement::Root,
        (Some(FolderKey::Folder(path)), Some(tree)) => match tree.id_for_key(&path) {
            Some(id) => Placement::Node(id.to_string()),
            None => Placement::Orphaned(path),
        },
    }
}

/// 单元的占用统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupancy {
    /// 根目录文件数
    pub root: usize,
    /// 节点 ID → 文件数（只含直接位于该节点的文件）
    pub nodes: HashMap<String, usize>,
    /// 文件夹不在当前结构中的文件数
    pub orphaned: usize,
    /// 无法归属到该单元的 URL 数
    pub unattributed: usize,
}

impl Occupancy {
    pub fn compute(urls: &[String], unit_id: &str, tree: Option<&FolderTree>) -> Self {
        let mut occupancy = Occupancy::default();
        for url in urls {
            match place(url, unit_id, tree) {
                Placement::Root => occupancy.root += 1,
                Placement::Node(id) => *occupancy.nodes.entry(id).or_insert(0) += 1,
                Placement::Orphaned(_) => occupancy.orphaned += 1,
                Placement::Unattributed => occupancy.unattributed += 1,
            }
        }
        occupancy
    }

    /// 某个节点的文件数
    pub fn count_for(&self, node_id: &str) -> usize {
        self.nodes.get(node_id).copied().unwrap_or(0)
    }

    /// 可归属到该单元的文件总数
    pub fn attributed(&self) -> usize {
        self.root + self.nodes.values().sum::<usize>() + self.orphaned
    }
}

/// 筛选位于指定位置的文件
///
/// `node_id` 为 None 表示根目录
pub fn files_in<'a>(
    urls: &'a [String],
    unit_id: &str,
    tree: Option<&FolderTree>,
    node_id: Option<&str>,
) -> Vec<&'a str> {
    urls.iter()
        .filter(|url| match (place(url, unit_id, tree), node_id) {
            (Placement::Root, None) => true,
            (Placement::Node(id), Some(target)) => id == target,
            _ => false,
        })
        .map(String::as_str)
        .collect()
}
