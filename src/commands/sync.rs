//! 同步相关命令

use crate::core::{
    Category, Controller, DiffResult, LocalWatcher, PreviousSnapshot, ScheduleConfig, Scheduler,
    SyncOptions, SyncOutcome, SyncService,
};
use crate::AppState;
use std::str::FromStr;
use tracing::{info, warn};

/// 固定的同步方向组合
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Pull,
    Push,
    Sync,
    PullInverted,
    PushInverted,
}

impl Preset {
    pub fn controller(self) -> Controller {
        match self {
            Preset::Pull => Controller::pull(),
            Preset::Push => Controller::push(),
            Preset::Sync => Controller::sync(),
            Preset::PullInverted => Controller::pull_inverted(),
            Preset::PushInverted => Controller::push_inverted(),
        }
    }
}

/// 检查差异
pub async fn check(service: &SyncService) -> Result<DiffResult, String> {
    service.check().await.map_err(|e| e.to_string())
}

/// 执行同步
pub async fn start_sync(
    service: &SyncService,
    preset: Preset,
    force: bool,
) -> Result<SyncOutcome, String> {
    let options = SyncOptions { force, auto: false };
    service
        .sync(&preset.controller(), options)
        .await
        .map_err(|e| e.to_string())
}

/// 保存当前本地状态为一致快照
pub async fn save(service: &SyncService) -> Result<PreviousSnapshot, String> {
    service.save().await.map_err(|e| e.to_string())
}

/// 清除错误标记
pub async fn clear_error(service: &SyncService) -> Result<bool, String> {
    service.clear_error().await.map_err(|e| e.to_string())
}

/// 解析冲突处理方式，只接受 added / deleted / modified
pub fn parse_resolution(value: &str) -> Result<Category, String> {
    match Category::from_str(value)? {
        Category::Except => Err("冲突只能按 added / deleted / modified 处理".to_string()),
        category => Ok(category),
    }
}

/// 记录冲突处理并保存
pub async fn resolve(
    service: &SyncService,
    path: &str,
    category: Category,
) -> Result<PreviousSnapshot, String> {
    service
        .resolve_conflict(path, category)
        .await
        .map_err(|e| e.to_string())
}

/// 启动调度器（和实时同步时的本地监听），直到收到 Ctrl-C
pub async fn watch(state: &AppState) -> Result<usize, String> {
    let settings = state.service.settings().clone();
    let config = ScheduleConfig::from_settings(&settings);
    if config.interval.is_none() && !config.live_sync {
        return Err("未开启定时同步或实时同步".to_string());
    }

    let scheduler = Scheduler::start(state.service.clone(), config);

    let _watcher = if config.live_sync {
        let watcher = LocalWatcher::start(
            &settings.local_root,
            state.service.rules().clone(),
            scheduler.trigger(),
        )
        .map_err(|e| format!("{:#}", e))?;
        info!("正在监听: {}", watcher.root().display());
        Some(watcher)
    } else {
        None
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("等待退出信号失败: {}", e);
    }
    info!("收到退出信号，正在停止...");

    Ok(scheduler.shutdown().await)
}
