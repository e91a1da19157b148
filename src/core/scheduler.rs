//! 自动同步与实时同步调度
//!
//! 单个后台任务处理定时触发和本地变化触发。本地变化会重新开始防抖计时，
//! 窗口内没有新变化时才执行一次同步。

use super::engine::{SyncOptions, SyncService};
use super::error::SyncError;
use super::plan::Controller;
use crate::config::Settings;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 调度参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    /// 定时同步间隔，`None` 表示关闭
    pub interval: Option<Duration>,
    pub live_sync: bool,
    pub debounce: Duration,
}

impl ScheduleConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            interval: settings.auto_sync_interval(),
            live_sync: settings.live_sync,
            debounce: settings.live_sync_debounce(),
        }
    }
}

/// 后台调度器
pub struct Scheduler {
    cancel: CancellationToken,
    trigger: UnboundedSender<String>,
    handle: JoinHandle<usize>,
}

impl Scheduler {
    pub fn start(service: Arc<SyncService>, config: ScheduleConfig) -> Self {
        let cancel = CancellationToken::new();
        let (trigger, rx) = mpsc::unbounded_channel();

        info!(
            "调度器启动: 定时同步 {}, 实时同步 {}",
            config
                .interval
                .map(|d| format!("每 {} 秒", d.as_secs()))
                .unwrap_or_else(|| "关闭".to_string()),
            if config.live_sync { "开启" } else { "关闭" }
        );

        let handle = tokio::spawn(run(service, config, rx, cancel.clone()));
        Self {
            cancel,
            trigger,
            handle,
        }
    }

    /// 本地变化的发送端，交给监听器使用
    pub fn trigger(&self) -> UnboundedSender<String> {
        self.trigger.clone()
    }

    /// 停止调度并等待当前同步结束，返回执行过的同步次数
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();
        match self.handle.await {
            Ok(runs) => runs,
            Err(e) => {
                warn!("调度任务异常退出: {}", e);
                0
            }
        }
    }
}

async fn run(
    service: Arc<SyncService>,
    config: ScheduleConfig,
    mut rx: UnboundedReceiver<String>,
    cancel: CancellationToken,
) -> usize {
    let mut ticker = config.interval.map(|period| {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });
    let mut deadline: Option<Instant> = None;
    let mut runs = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tick(&mut ticker) => {
                debug!("定时同步触发");
                runs += auto_sync(&service).await;
            }
            Some(path) = rx.recv() => {
                if config.live_sync {
                    debug!("本地变化，重新计时: {}", path);
                    deadline = Some(Instant::now() + config.debounce);
                }
            }
            _ = wait_until(deadline) => {
                deadline = None;
                debug!("实时同步触发");
                runs += auto_sync(&service).await;
            }
        }
    }

    info!("调度器已停止");
    runs
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// 执行一次自动同步。正忙、暂停、出错时跳过
async fn auto_sync(service: &SyncService) -> usize {
    let options = SyncOptions {
        force: false,
        auto: true,
    };
    match service.sync(&Controller::sync(), options).await {
        Ok(outcome) => {
            info!("自动同步完成: {}", outcome);
            1
        }
        Err(e @ (SyncError::Busy(_) | SyncError::Paused | SyncError::StateFlagged)) => {
            debug!("跳过自动同步: {}", e);
            0
        }
        Err(e) => {
            warn!("自动同步失败: {}", e);
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeSettings;
    use crate::core::engine::SyncContext;
    use crate::core::state::StateStore;
    use crate::storage::memory::MemoryRemote;
    use crate::storage::{FsVault, LocalVault};
    use tempfile::TempDir;

    async fn service() -> (TempDir, TempDir, Arc<FsVault>, Arc<MemoryRemote>, Arc<SyncService>) {
        let vault_dir = tempfile::tempdir().unwrap();
        let config_dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(FsVault::new(vault_dir.path()).unwrap());
        let remote = Arc::new(MemoryRemote::new());
        let settings = Settings {
            probe: ProbeSettings {
                attempts: 1,
                timeout_secs: 1,
                backoff_ms: 0,
            },
            ..Default::default()
        };
        let service = Arc::new(SyncService::new(SyncContext {
            settings,
            local: vault.clone(),
            remote: remote.clone(),
            state: StateStore::load(config_dir.path()),
        }));

        vault.write("a.md", b"alpha").await.unwrap();
        let options = SyncOptions {
            force: true,
            auto: false,
        };
        service.sync(&Controller::push(), options).await.unwrap();
        (vault_dir, config_dir, vault, remote, service)
    }

    #[tokio::test]
    async fn test_live_sync_debounces_bursts() {
        let (_v, _c, vault, remote, service) = service().await;
        let scheduler = Scheduler::start(
            service,
            ScheduleConfig {
                interval: None,
                live_sync: true,
                debounce: Duration::from_millis(100),
            },
        );

        vault.write("b.md", b"beta").await.unwrap();
        let trigger = scheduler.trigger();
        for _ in 0..3 {
            trigger.send("b.md".to_string()).unwrap();
        }

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(scheduler.shutdown().await, 1);
        assert_eq!(remote.contents("vault/b.md").unwrap(), b"beta");
    }

    #[tokio::test]
    async fn test_triggers_ignored_without_live_sync() {
        let (_v, _c, _vault, _remote, service) = service().await;
        let scheduler = Scheduler::start(
            service,
            ScheduleConfig {
                interval: None,
                live_sync: false,
                debounce: Duration::from_millis(10),
            },
        );

        scheduler.trigger().send("a.md".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(scheduler.shutdown().await, 0);
    }

    #[tokio::test]
    async fn test_interval_runs_auto_sync() {
        let (_v, _c, _vault, remote, service) = service().await;
        let scheduler = Scheduler::start(
            service,
            ScheduleConfig {
                interval: Some(Duration::from_millis(100)),
                live_sync: false,
                debounce: Duration::from_millis(10),
            },
        );

        remote.insert("vault/r.md", b"remote");
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(scheduler.shutdown().await >= 2);
    }
}
