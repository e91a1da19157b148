//! 上次一致快照的持久化
//!
//! 快照文件只会被整体替换，写入后立即落盘。

use super::tree::{Category, FileList};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 快照文件名
pub const STATE_FILE: &str = "prev_data.json";

/// 上次两侧一致时的快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviousSnapshot {
    pub date: DateTime<Utc>,
    /// 置位时快照不可信，同步与保存都会被拒绝
    pub error: bool,
    pub files: FileList,
    /// 尚未解决的冲突
    pub except: FileList,
}

impl PreviousSnapshot {
    /// 首次运行或快照损坏时的空快照，错误标记置位以强制完整对账
    pub fn empty() -> Self {
        Self {
            date: Utc::now(),
            error: true,
            files: FileList::new(),
            except: FileList::new(),
        }
    }
}

/// 保存快照时对单个路径的改写规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteRule {
    /// 使用新计算的指纹
    KeepFresh,
    /// 写回上次快照中的指纹（视为未变化，冲突留到下次处理）
    ForcePrevious,
}

/// 本地冲突被用户处理后的改写表
pub fn rewrite_rule(category: Category) -> Option<RewriteRule> {
    match category {
        Category::Added => Some(RewriteRule::KeepFresh),
        Category::Deleted | Category::Modified => Some(RewriteRule::ForcePrevious),
        Category::Except => None,
    }
}

/// 按改写表修正即将保存的快照
pub fn apply_overrides(
    fresh: &mut FileList,
    previous: &FileList,
    overrides: &BTreeMap<String, Category>,
) {
    for (path, category) in overrides {
        match rewrite_rule(*category) {
            Some(RewriteRule::KeepFresh) | None => {}
            Some(RewriteRule::ForcePrevious) => match previous.get(path) {
                Some(fingerprint) => {
                    debug!("保留上次指纹: {} ({})", path, category);
                    fresh.insert(path.clone(), fingerprint.clone());
                }
                None => {
                    fresh.remove(path);
                }
            },
        }
    }
}

/// 快照存储
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    snapshot: PreviousSnapshot,
}

impl StateStore {
    /// 从配置目录加载快照。缺失或损坏时回退为带错误标记的空快照
    pub fn load(config_dir: &Path) -> Self {
        let path = config_dir.join(STATE_FILE);

        let snapshot = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<PreviousSnapshot>(&data) {
                Ok(snapshot) => {
                    info!(
                        "已加载上次快照: {} 个条目, {} 个冲突",
                        snapshot.files.len(),
                        snapshot.except.len()
                    );
                    snapshot
                }
                Err(e) => {
                    warn!("快照文件损坏，需要重新完整对账: {}", e);
                    PreviousSnapshot::empty()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("未找到上次快照，首次同步需要完整对账");
                PreviousSnapshot::empty()
            }
            Err(e) => {
                warn!("读取快照失败，需要重新完整对账: {}", e);
                PreviousSnapshot::empty()
            }
        };

        Self { path, snapshot }
    }

    pub fn snapshot(&self) -> &PreviousSnapshot {
        &self.snapshot
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 整体替换并落盘
    pub fn replace(&mut self, snapshot: PreviousSnapshot) -> Result<()> {
        Self::persist(&self.path, &snapshot)?;
        self.snapshot = snapshot;
        Ok(())
    }

    /// 修改错误标记并落盘
    pub fn set_error(&mut self, error: bool) -> Result<()> {
        if self.snapshot.error == error {
            return Ok(());
        }
        let snapshot = PreviousSnapshot {
            error,
            ..self.snapshot.clone()
        };
        self.replace(snapshot)
    }

    fn persist(path: &Path, snapshot: &PreviousSnapshot) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(snapshot)?;

        // 临时文件 + 重命名，避免写到一半留下损坏的快照
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, content)
            .with_context(|| format!("写入快照失败: {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("替换快照失败: {}", path.display()))?;
        Ok(())
    }
}
