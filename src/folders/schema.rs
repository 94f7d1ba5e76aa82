// 文件夹结构解析
//
// 服务端返回两种形状之一：
// - { folderPaths: [{ id, path }] }          已展开的路径列表
// - { folders: [{ id, name, parentId? }] }   父子节点列表，需要沿父链拼出路径
// 在边界处统一转换为 Vec<FolderPath>，之后的逻辑不再区分来源形状

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// 路径分隔符
pub const PATH_SEPARATOR: char = '/';

/// 规范化后的文件夹路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderPath {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub path: String,
}

/// 父子节点形状中的一个节点
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "parent_id", deserialize_with = "deserialize_optional_id")]
    pub parent_id: Option<String>,
}

/// 文件夹结构接口原始响应
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSchemaResponse {
    #[serde(default)]
    pub folder_paths: Option<Vec<FolderPath>>,
    #[serde(default)]
    pub folders: Option<Vec<SchemaNode>>,
}

/// 文件夹结构
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderSchema {
    /// 已展开的路径列表
    Paths(Vec<FolderPath>),
    /// 父子节点列表
    Nodes(Vec<SchemaNode>),
    /// 没有自定义结构
    Flat,
}

impl From<FolderSchemaResponse> for FolderSchema {
    fn from(resp: FolderSchemaResponse) -> Self {
        // 两种形状同时存在时以 folderPaths 为准
        match (resp.folder_paths, resp.folders) {
            (Some(paths), _) if !paths.is_empty() => FolderSchema::Paths(paths),
            (_, Some(nodes)) if !nodes.is_empty() => FolderSchema::Nodes(nodes),
            _ => FolderSchema::Flat,
        }
    }
}

impl FolderSchema {
    pub fn is_flat(&self) -> bool {
        matches!(self, FolderSchema::Flat)
    }

    /// 解析为规范化的路径列表
    ///
    /// 路径段两端空白被去除，空段被跳过，空路径被丢弃
    pub fn resolve(self) -> Vec<FolderPath> {
        match self {
            FolderSchema::Flat => Vec::new(),
            FolderSchema::Paths(paths) => paths
                .into_iter()
                .filter_map(|fp| {
                    let path = clean_path(&fp.path);
                    (!path.is_empty()).then_some(FolderPath { id: fp.id, path })
                })
                .collect(),
            FolderSchema::Nodes(nodes) => resolve_nodes(&nodes),
        }
    }
}

/// 去除空段并重新拼接
pub fn clean_path(path: &str) -> String {
    split_segments(path).collect::<Vec<_>>().join("/")
}

/// 按分隔符切分，去除空白与空段
pub fn split_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(PATH_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn resolve_nodes(nodes: &[SchemaNode]) -> Vec<FolderPath> {
    let index: HashMap<&str, &SchemaNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    nodes
        .iter()
        .filter_map(|node| {
            let mut visited = HashSet::new();
            let path = node_path(&node.id, &index, &mut visited);
            (!path.is_empty()).then(|| FolderPath {
                id: node.id.clone(),
                path,
            })
        })
        .collect()
}

/// 沿父链拼出节点的完整路径（从根到节点）
///
/// `visited` 记录已经走过的节点；遇到环时在环入口截断，不会无限循环
pub fn node_path(
    id: &str,
    index: &HashMap<&str, &SchemaNode>,
    visited: &mut HashSet<String>,
) -> String {
    let mut names = Vec::new();
    let mut current = index.get(id).copied();

    while let Some(node) = current {
        if !visited.insert(node.id.clone()) {
            warn!("文件夹结构存在循环引用，路径已截断: id={}", id);
            break;
        }
        names.push(node.name.trim());
        current = node
            .parent_id
            .as_deref()
            .and_then(|parent| index.get(parent).copied());
    }

    names.reverse();
    names
        .into_iter()
        .filter(|n| !n.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// 节点 ID 可能是字符串或数字
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(IdVisitor)
}

fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let id: Option<String> = deserializer.deserialize_option(OptionalIdVisitor)?;
    Ok(id.filter(|s| !s.is_empty()))
}

struct IdVisitor;

impl<'de> serde::de::Visitor<'de> for IdVisitor {
    type Value = String;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("a string or integer id")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v.to_string())
    }

    fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v)
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v.to_string())
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(v.to_string())
    }
}

struct OptionalIdVisitor;

impl<'de> serde::de::Visitor<'de> for OptionalIdVisitor {
    type Value = Option<String>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("null or a string or integer id")
    }

    fn visit_none<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(None)
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        Ok(None)
    }

    fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserialize_id(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> FolderSchema {
        serde_json::from_value::<FolderSchemaResponse>(value)
            .unwrap()
            .into()
    }

    fn paths(resolved: &[FolderPath]) -> Vec<(&str, &str)> {
        resolved
            .iter()
            .map(|fp| (fp.id.as_str(), fp.path.as_str()))
            .collect()
    }

    #[test]
    fn test_folder_paths_shape() {
        let schema = parse(json!({
            "folderPaths": [
                { "id": "1", "path": "Docs" },
                { "id": 2, "path": "/Docs//Scans/" },
                { "id": "3", "path": "  " }
            ]
        }));
        assert!(matches!(schema, FolderSchema::Paths(_)));

        let resolved = schema.resolve();
        assert_eq!(paths(&resolved), vec![("1", "Docs"), ("2", "Docs/Scans")]);
    }

    #[test]
    fn test_node_list_shape() {
        let schema = parse(json!({
            "folders": [
                { "id": 1, "name": "Docs" },
                { "id": 2, "name": "Scans", "parentId": 1 },
                { "id": 3, "name": "Photos", "parentId": null },
                { "id": 4, "name": "Night", "parentId": "2" }
            ]
        }));

        let resolved = schema.resolve();
        assert_eq!(
            paths(&resolved),
            vec![
                ("1", "Docs"),
                ("2", "Docs/Scans"),
                ("3", "Photos"),
                ("4", "Docs/Scans/Night")
            ]
        );
    }

    #[test]
    fn test_missing_parent_starts_at_top_level() {
        let resolved = parse(json!({
            "folders": [{ "id": "a", "name": "Loose", "parentId": "gone" }]
        }))
        .resolve();
        assert_eq!(paths(&resolved), vec![("a", "Loose")]);
    }

    #[test]
    fn test_cycle_is_truncated() {
        let resolved = parse(json!({
            "folders": [
                { "id": "a", "name": "A", "parentId": "b" },
                { "id": "b", "name": "B", "parentId": "a" },
                { "id": "c", "name": "Self", "parentId": "c" }
            ]
        }))
        .resolve();
        assert_eq!(paths(&resolved), vec![("a", "B/A"), ("b", "A/B"), ("c", "Self")]);
    }

    #[test]
    fn test_empty_names_are_skipped() {
        let resolved = parse(json!({
            "folders": [
                { "id": "1", "name": "" },
                { "id": "2", "name": "Leaf", "parentId": "1" }
            ]
        }))
        .resolve();
        assert_eq!(paths(&resolved), vec![("2", "Leaf")]);
    }

    #[test]
    fn test_flat_when_absent_or_empty() {
        assert!(parse(json!({})).is_flat());
        assert!(parse(json!({ "folderPaths": [], "folders": [] })).is_flat());
        assert!(parse(json!({ "folderPaths": null })).is_flat());
    }

    #[test]
    fn test_folder_paths_win_over_nodes() {
        let schema = parse(json!({
            "folderPaths": [{ "id": "p", "path": "FromPaths" }],
            "folders": [{ "id": "n", "name": "FromNodes" }]
        }));
        assert_eq!(paths(&schema.resolve()), vec![("p", "FromPaths")]);
    }
}
