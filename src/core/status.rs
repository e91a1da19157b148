//! 同步状态机：进程内唯一的单飞闸门

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use super::error::SyncError;

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Checking,
    Pulling,
    Pushing,
    Syncing,
    AutoSyncing,
    Saving,
    Testing,
    Error,
    Paused,
    Offline,
}

impl SyncStatus {
    /// 允许开始新操作的状态
    pub fn is_ready(self) -> bool {
        matches!(self, SyncStatus::Idle | SyncStatus::Offline)
    }

    /// 给用户看的简短状态
    pub fn message(self) -> &'static str {
        match self {
            SyncStatus::Idle => "空闲",
            SyncStatus::Checking => "正在检查差异...",
            SyncStatus::Pulling => "正在拉取...",
            SyncStatus::Pushing => "正在推送...",
            SyncStatus::Syncing => "正在同步...",
            SyncStatus::AutoSyncing => "正在自动同步...",
            SyncStatus::Saving => "正在保存快照...",
            SyncStatus::Testing => "正在测试连接...",
            SyncStatus::Error => "同步出错，请清除错误后重试",
            SyncStatus::Paused => "已暂停",
            SyncStatus::Offline => "无法连接远程存储",
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        write!(f, "{}", name)
    }
}

/// 单飞闸门。克隆共享同一状态
#[derive(Debug, Clone)]
pub struct StatusGate {
    status: Arc<Mutex<SyncStatus>>,
}

impl Default for StatusGate {
    fn default() -> Self {
        Self::new(SyncStatus::Idle)
    }
}

impl StatusGate {
    pub fn new(initial: SyncStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(initial)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncStatus> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> SyncStatus {
        *self.lock()
    }

    /// 直接设置状态
    pub fn set(&self, status: SyncStatus) {
        let mut current = self.lock();
        if *current != status {
            debug!("状态: {} -> {}", *current, status);
            *current = status;
        }
    }

    /// 空闲或离线时进入 `target`，否则报告当前状态且不做任何改动
    pub fn begin(&self, target: SyncStatus) -> Result<Lease, SyncError> {
        let mut current = self.lock();
        match *current {
            status if status.is_ready() => {
                debug!("状态: {} -> {}", status, target);
                *current = target;
                Ok(Lease {
                    gate: self.clone(),
                    released: false,
                })
            }
            SyncStatus::Paused => Err(SyncError::Paused),
            SyncStatus::Error => Err(SyncError::StateFlagged),
            busy => Err(SyncError::Busy(busy)),
        }
    }

    /// 暂停/恢复。返回切换后的状态
    pub fn toggle_pause(&self) -> Result<SyncStatus, SyncError> {
        let mut current = self.lock();
        let next = match *current {
            SyncStatus::Paused => SyncStatus::Idle,
            status if status.is_ready() => SyncStatus::Paused,
            SyncStatus::Error => return Err(SyncError::StateFlagged),
            busy => return Err(SyncError::Busy(busy)),
        };
        info!("{}", next.message());
        *current = next;
        Ok(next)
    }

    /// 清除错误状态
    pub fn clear_error(&self) -> bool {
        let mut current = self.lock();
        if *current == SyncStatus::Error {
            *current = SyncStatus::Idle;
            true
        } else {
            false
        }
    }
}

/// 持有闸门期间的凭据。未显式结束就被丢弃时回到 `Idle`
#[derive(Debug)]
pub struct Lease {
    gate: StatusGate,
    released: bool,
}

impl Lease {
    /// 切换运行中的状态（例如同步中转为保存）
    pub fn update(&self, status: SyncStatus) {
        self.gate.set(status);
    }

    /// 结束操作并进入给定状态
    pub fn finish(mut self, status: SyncStatus) {
        self.released = true;
        self.gate.set(status);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            self.gate.set(SyncStatus::Idle);
        }
    }
}
