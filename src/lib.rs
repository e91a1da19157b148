use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod commands;
pub mod config;
pub mod core;
pub mod logging;
pub mod storage;

pub use config::Settings;
pub use core::{Controller, SyncError, SyncOptions, SyncOutcome, SyncService, SyncStatus};

use core::{StateStore, SyncContext};
use storage::{FsVault, WebDavRemote};

/// 应用状态，在各命令之间共享
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SyncService>,
    pub config_dir: PathBuf,
}

impl AppState {
    pub fn new(config_dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("无法创建配置目录: {}", config_dir.display()))?;

        let settings = Settings::load(&config_dir);
        let local = FsVault::new(&settings.local_root)
            .with_context(|| format!("无法打开本地库: {}", settings.local_root.display()))?;
        let remote = WebDavRemote::new(&settings)?;
        let state = StateStore::load(&config_dir);

        let service = SyncService::new(SyncContext {
            settings,
            local: Arc::new(local),
            remote: Arc::new(remote),
            state,
        });

        Ok(Self {
            service: Arc::new(service),
            config_dir,
        })
    }
}

/// 确定配置目录：显式指定优先，否则使用默认目录（其中的 `data_path` 可以改写它）
pub fn config_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| resolve_config_dir(&dirs::default_config_dir()))
}

/// 读取默认目录中配置的自定义数据路径
fn resolve_config_dir(default_dir: &Path) -> PathBuf {
    std::fs::read_to_string(default_dir.join(config::CONFIG_FILE))
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get("data_path")?.as_str().map(PathBuf::from))
        .filter(|p| p.is_dir())
        .inspect(|p| tracing::debug!("使用自定义数据路径: {:?}", p))
        .unwrap_or_else(|| default_dir.to_path_buf())
}

pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }

    /// vaultsync 的默认配置目录
    pub fn default_config_dir() -> PathBuf {
        config_dir()
            .map(|p| p.join("vaultsync"))
            .unwrap_or_else(|| PathBuf::from(".vaultsync"))
    }
}
