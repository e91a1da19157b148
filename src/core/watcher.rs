//! 本地变化监听，供实时同步使用

use super::filter::ExclusionRules;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// 写入时使用的临时文件后缀，不触发同步
const TEMP_SUFFIX: &str = ".vaultsync-tmp";

/// 监听库目录，把变化的相对路径发送给调度器。丢弃即停止监听
pub struct LocalWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl LocalWatcher {
    pub fn start(root: &Path, rules: ExclusionRules, tx: UnboundedSender<String>) -> Result<Self> {
        // 事件里的路径是绝对路径
        let base = root
            .canonicalize()
            .with_context(|| format!("无效的库目录: {}", root.display()))?;
        let handler_root = base.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("监听错误: {}", e);
                    return;
                }
            };
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            for path in &event.paths {
                let Some(relative) = relative_event_path(&handler_root, path) else {
                    continue;
                };
                if relative.ends_with(TEMP_SUFFIX) || rules.is_excluded(&relative) {
                    continue;
                }
                debug!("本地变化: {}", relative);
                // 接收端关闭说明调度器已停止
                let _ = tx.send(relative);
            }
        })
        .context("创建文件监听器失败")?;

        watcher
            .watch(&base, RecursiveMode::Recursive)
            .with_context(|| format!("无法监听目录: {}", base.display()))?;

        Ok(Self {
            _watcher: watcher,
            root: base,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// 事件路径转换为库内相对路径
pub fn relative_event_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.to_str()?.replace('\\', "/");
    (!relative.is_empty()).then_some(relative)
}
