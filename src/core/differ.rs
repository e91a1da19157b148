//! 三方对账
//!
//! 本地、远程各自与上次快照做两方比较，再交叉对账，最后校验删除项。
//! 两侧的原始差异在交叉对账之前可以单独查看。

use super::state::PreviousSnapshot;
use super::tree::{Category, FileList, FileTree, Side};
use serde::Serialize;
use tracing::debug;

/// 一次检查的结果
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffResult {
    pub local_files: FileTree,
    pub remote_files: FileTree,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.local_files.is_empty() && self.remote_files.is_empty()
    }

    pub fn tree(&self, side: Side) -> &FileTree {
        match side {
            Side::Local => &self.local_files,
            Side::Remote => &self.remote_files,
        }
    }

    pub fn summarize(&self) -> DiffSummary {
        let count = |tree: &FileTree| {
            [
                tree.added.len(),
                tree.deleted.len(),
                tree.modified.len(),
                tree.except.len(),
            ]
        };
        DiffSummary {
            local: count(&self.local_files),
            remote: count(&self.remote_files),
        }
    }
}

/// 各分类的数量，顺序为 added / deleted / modified / except
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub local: [usize; 4],
    pub remote: [usize; 4],
}

impl DiffSummary {
    pub fn conflict_count(&self) -> usize {
        self.local[3].max(self.remote[3])
    }
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [la, ld, lm, le] = self.local;
        let [ra, rd, rm, re] = self.remote;
        write!(
            f,
            "本地 +{} -{} ~{} !{} | 远程 +{} -{} ~{} !{}",
            la, ld, lm, le, ra, rd, rm, re
        )
    }
}

/// 某一侧与上次快照的两方比较
pub fn diff_against_previous(
    previous_files: &FileList,
    previous_except: &FileList,
    current: &FileList,
) -> FileTree {
    let mut tree = FileTree::default();

    // 仍存在的冲突沿用下来，值取当前指纹，便于之后判断两侧是否已收敛
    for path in previous_except.keys() {
        if let Some(fingerprint) = current.get(path) {
            tree.insert(Category::Except, path, fingerprint);
        }
    }

    for (path, fingerprint) in current {
        if tree.except.contains_key(path) {
            continue;
        }
        match previous_files.get(path) {
            Some(previous) if previous == fingerprint => {}
            Some(_) => tree.insert(Category::Modified, path, fingerprint),
            None => tree.insert(Category::Added, path, fingerprint),
        }
    }

    for (path, previous) in previous_files {
        if !current.contains_key(path) {
            tree.insert(Category::Deleted, path, previous);
        }
    }

    tree
}

/// 交叉对账：解决两侧独立比较产生的表面冲突
pub fn reconcile(remote: &mut FileTree, local: &mut FileTree) {
    // 1. 两侧都修改：不替用户选择，标记为冲突
    let modified: Vec<String> = remote.modified.keys().cloned().collect();
    for path in modified {
        if local.modified.contains_key(&path) {
            remote.move_to(&path, Category::Except);
            local.move_to(&path, Category::Except);
        }
    }

    // 2. 两侧都新增：内容相同则无需处理，不同则冲突
    let added: Vec<(String, String)> = remote
        .added
        .iter()
        .map(|(p, f)| (p.clone(), f.clone()))
        .collect();
    for (path, fingerprint) in added {
        match local.added.get(&path) {
            Some(local_fingerprint) if *local_fingerprint == fingerprint => {
                remote.remove(&path);
                local.remove(&path);
            }
            Some(_) => {
                remote.move_to(&path, Category::Except);
                local.move_to(&path, Category::Except);
            }
            None => {}
        }
    }

    // 3. 冲突两侧指纹已一致：视为已解决
    let excepted: Vec<(String, String)> = local
        .except
        .iter()
        .map(|(p, f)| (p.clone(), f.clone()))
        .collect();
    for (path, fingerprint) in excepted {
        if remote.except.get(&path) == Some(&fingerprint) {
            debug!("冲突已收敛: {}", path);
            remote.remove(&path);
            local.remove(&path);
        }
    }
}

/// 删除项校验：一侧报告的删除，只有在另一侧当前快照仍存在该路径时才保留
pub fn cross_validate_deletions(
    remote: &mut FileTree,
    local: &mut FileTree,
    live_local: &FileList,
    live_remote: &FileList,
) {
    remote.retain(Category::Deleted, |path| live_local.contains_key(path));
    local.retain(Category::Deleted, |path| live_remote.contains_key(path));
}

/// 三方差异计算器
#[derive(Debug, Default)]
pub struct TreeDiffer;

impl TreeDiffer {
    pub fn new() -> Self {
        Self
    }

    /// 用上次快照比较两侧当前快照
    pub fn compare(
        &self,
        previous: &PreviousSnapshot,
        local: &FileList,
        remote: &FileList,
    ) -> DiffResult {
        // 远程为空：整个本地都是新增，不对远程提出任何操作
        if remote.is_empty() {
            debug!("远程快照为空，本地 {} 个条目全部视为新增", local.len());
            return DiffResult {
                local_files: FileTree::all_added(local),
                remote_files: FileTree::default(),
            };
        }

        // 没有上次快照：两侧整体视为新增，直接交叉对账
        if previous.files.is_empty() {
            debug!("没有上次快照，按两侧整体新增进行对账");
            let mut remote_files = FileTree::all_added(remote);
            let mut local_files = FileTree::all_added(local);
            reconcile(&mut remote_files, &mut local_files);
            return DiffResult {
                local_files,
                remote_files,
            };
        }

        let mut local_files = diff_against_previous(&previous.files, &previous.except, local);
        let mut remote_files = diff_against_previous(&previous.files, &previous.except, remote);
        reconcile(&mut remote_files, &mut local_files);
        cross_validate_deletions(&mut remote_files, &mut local_files, local, remote);

        DiffResult {
            local_files,
            remote_files,
        }
    }
}
