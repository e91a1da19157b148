use super::status::SyncStatus;
use thiserror::Error;

/// 同步操作的错误分类
#[derive(Debug, Error)]
pub enum SyncError {
    /// 已有操作在运行
    #[error("正在运行: {}", .0.message())]
    Busy(SyncStatus),

    #[error("同步已暂停")]
    Paused,

    /// 远程无法访问或探测超时，可在下次触发时重试
    #[error("无法连接远程存储: {0}")]
    Connectivity(String),

    /// 持久化快照带有错误标记，需要清除或强制执行
    #[error("快照状态不可信，请先清除错误（或使用强制同步）")]
    StateFlagged,

    /// 对账或保存阶段的意外失败，会设置持久化错误标记
    #[error("同步计划执行失败: {0}")]
    Planning(String),

    #[error("无效的请求: {0}")]
    Invalid(String),

    #[error("远程存储错误: {0:#}")]
    Remote(anyhow::Error),

    #[error("本地存储错误: {0:#}")]
    Local(anyhow::Error),

    #[error("快照读写失败: {0:#}")]
    State(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
