//! 传输计划：按控制器把差异翻译为传输任务

use super::differ::DiffResult;
use super::status::SyncStatus;
use super::tree::{Category, FileList, Side};
use std::collections::BTreeMap;

/// 方向：`Forward` 表示 +1，`Reverse` 表示 -1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// 传输任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Download,
    Upload,
    DeleteLocal,
    DeleteRemote,
}

impl TaskKind {
    pub fn is_delete(self) -> bool {
        matches!(self, TaskKind::DeleteLocal | TaskKind::DeleteRemote)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Download => write!(f, "下载"),
            TaskKind::Upload => write!(f, "上传"),
            TaskKind::DeleteLocal => write!(f, "删除本地"),
            TaskKind::DeleteRemote => write!(f, "删除远程"),
        }
    }
}

/// 分类与方向到任务类型的对照表；`None` 表示该组合不执行
pub fn task_for(side: Side, category: Category, direction: Direction) -> Option<TaskKind> {
    use Category::*;
    use Direction::*;
    use TaskKind::*;

    match (side, category, direction) {
        (Side::Remote, Added, Forward) => Some(Download),
        (Side::Remote, Added, Reverse) => Some(DeleteRemote),
        (Side::Remote, Deleted, Forward) => Some(DeleteLocal),
        (Side::Remote, Deleted, Reverse) => Some(Download),
        (Side::Remote, Modified | Except, Forward) => Some(Download),
        (Side::Local, Added, Forward) => Some(Upload),
        (Side::Local, Added, Reverse) => Some(DeleteLocal),
        (Side::Local, Deleted, Forward) => Some(DeleteRemote),
        (Side::Local, Deleted, Reverse) => Some(Upload),
        (Side::Local, Modified | Except, Forward) => Some(Upload),
        (_, Modified | Except, Reverse) => None,
    }
}

/// 一次运行要执行的分类、侧与方向
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Controller {
    directions: BTreeMap<(Side, Category), Direction>,
}

impl Controller {
    pub fn with(mut self, side: Side, category: Category, direction: Direction) -> Self {
        self.directions.insert((side, category), direction);
        self
    }

    pub fn direction(&self, side: Side, category: Category) -> Option<Direction> {
        self.directions.get(&(side, category)).copied()
    }

    fn with_all(self, side: Side, categories: &[Category], direction: Direction) -> Self {
        categories
            .iter()
            .fold(self, |controller, category| {
                controller.with(side, *category, direction)
            })
    }

    /// 拉取：远程全部分类 +1
    pub fn pull() -> Self {
        Self::default().with_all(Side::Remote, &Category::ALL, Direction::Forward)
    }

    /// 推送：本地全部分类 +1
    pub fn push() -> Self {
        Self::default().with_all(Side::Local, &Category::ALL, Direction::Forward)
    }

    /// 双向同步：两侧新增、删除、修改 +1，冲突留给用户
    pub fn sync() -> Self {
        let categories = [Category::Added, Category::Deleted, Category::Modified];
        Self::default()
            .with_all(Side::Remote, &categories, Direction::Forward)
            .with_all(Side::Local, &categories, Direction::Forward)
    }

    /// 反向拉取：撤销远程的新增与删除
    pub fn pull_inverted() -> Self {
        Self::default().with_all(
            Side::Remote,
            &[Category::Added, Category::Deleted],
            Direction::Reverse,
        )
    }

    /// 反向推送：撤销本地的新增与删除
    pub fn push_inverted() -> Self {
        Self::default().with_all(
            Side::Local,
            &[Category::Added, Category::Deleted],
            Direction::Reverse,
        )
    }

    /// 运行时展示的状态
    pub fn status(&self) -> SyncStatus {
        let touches = |side: Side| self.directions.keys().any(|(s, _)| *s == side);
        match (touches(Side::Local), touches(Side::Remote)) {
            (true, false) => SyncStatus::Pushing,
            (false, true) => SyncStatus::Pulling,
            _ => SyncStatus::Syncing,
        }
    }
}

/// 单个传输任务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    pub side: Side,
    pub category: Category,
    pub kind: TaskKind,
    pub paths: FileList,
}

/// 按表格顺序（先远程后本地，分类依次为新增、删除、修改、冲突）生成任务，跳过空任务
pub fn build_plan(diff: &DiffResult, controller: &Controller) -> Vec<TransferTask> {
    let mut tasks = Vec::new();

    for side in [Side::Remote, Side::Local] {
        let tree = diff.tree(side);
        for category in Category::ALL {
            let Some(direction) = controller.direction(side, category) else {
                continue;
            };
            let Some(kind) = task_for(side, category, direction) else {
                continue;
            };
            let paths = tree.list(category);
            if paths.is_empty() {
                continue;
            }
            tasks.push(TransferTask {
                side,
                category,
                kind,
                paths: paths.clone(),
            });
        }
    }

    tasks
}
