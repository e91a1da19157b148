//! 快照与差异树的数据模型

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::fingerprint::DIRECTORY_FINGERPRINT;

/// 路径 -> 指纹。目录路径以 `/` 结尾，指纹为空字符串
pub type FileList = BTreeMap<String, String>;

/// 遍历结果条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEntry {
    File { path: String, fingerprint: String },
    Directory { path: String },
}

impl FileEntry {
    pub fn path(&self) -> &str {
        match self {
            FileEntry::File { path, .. } | FileEntry::Directory { path } => path,
        }
    }

    pub fn fingerprint(&self) -> &str {
        match self {
            FileEntry::File { fingerprint, .. } => fingerprint,
            FileEntry::Directory { .. } => DIRECTORY_FINGERPRINT,
        }
    }
}

/// 把遍历结果收集为 `FileList`
pub fn collect_entries(entries: impl IntoIterator<Item = FileEntry>) -> FileList {
    entries
        .into_iter()
        .map(|entry| (entry.path().to_string(), entry.fingerprint().to_string()))
        .collect()
}

/// 同步的一侧
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

/// 变化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Added,
    Deleted,
    Modified,
    Except,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Added,
        Category::Deleted,
        Category::Modified,
        Category::Except,
    ];
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Added => write!(f, "added"),
            Category::Deleted => write!(f, "deleted"),
            Category::Modified => write!(f, "modified"),
            Category::Except => write!(f, "except"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(Category::Added),
            "deleted" => Ok(Category::Deleted),
            "modified" => Ok(Category::Modified),
            "except" => Ok(Category::Except),
            other => Err(format!("未知的分类: {}", other)),
        }
    }
}

/// 某一侧相对上次快照的分类结果
///
/// 同一路径任何时候至多出现在一个分类里，所有写入都经过 [`FileTree::insert`]。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTree {
    pub added: FileList,
    pub deleted: FileList,
    pub modified: FileList,
    pub except: FileList,
}

impl FileTree {
    pub fn list(&self, category: Category) -> &FileList {
        match category {
            Category::Added => &self.added,
            Category::Deleted => &self.deleted,
            Category::Modified => &self.modified,
            Category::Except => &self.except,
        }
    }

    fn list_mut(&mut self, category: Category) -> &mut FileList {
        match category {
            Category::Added => &mut self.added,
            Category::Deleted => &mut self.deleted,
            Category::Modified => &mut self.modified,
            Category::Except => &mut self.except,
        }
    }

    /// 整棵树都是 `added` 的树（引导阶段使用）
    pub fn all_added(files: &FileList) -> Self {
        Self {
            added: files.clone(),
            ..Default::default()
        }
    }

    /// 写入路径，先从其它分类中移除
    pub fn insert(&mut self, category: Category, path: &str, fingerprint: &str) {
        self.remove(path);
        self.list_mut(category)
            .insert(path.to_string(), fingerprint.to_string());
    }

    /// 从所有分类中移除，返回原分类和指纹
    pub fn remove(&mut self, path: &str) -> Option<(Category, String)> {
        Category::ALL.iter().find_map(|&category| {
            self.list_mut(category)
                .remove(path)
                .map(|fingerprint| (category, fingerprint))
        })
    }

    /// 移动到另一分类，保留指纹
    pub fn move_to(&mut self, path: &str, category: Category) {
        if let Some((_, fingerprint)) = self.remove(path) {
            self.list_mut(category).insert(path.to_string(), fingerprint);
        }
    }

    pub fn category_of(&self, path: &str) -> Option<Category> {
        Category::ALL
            .iter()
            .copied()
            .find(|&category| self.list(category).contains_key(path))
    }

    /// 只保留满足条件的路径
    pub fn retain(&mut self, category: Category, mut keep: impl FnMut(&str) -> bool) {
        self.list_mut(category).retain(|path, _| keep(path));
    }

    pub fn is_empty(&self) -> bool {
        Category::ALL.iter().all(|&c| self.list(c).is_empty())
    }

    pub fn len(&self) -> usize {
        Category::ALL.iter().map(|&c| self.list(c).len()).sum()
    }

    /// 四个分类两两不相交
    pub fn is_partitioned(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        Category::ALL
            .iter()
            .flat_map(|&c| self.list(c).keys())
            .all(|path| seen.insert(path))
    }
}
