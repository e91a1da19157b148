//! 同步编排：检查差异、执行传输计划、保存快照

use super::differ::{DiffResult, DiffSummary, TreeDiffer};
use super::error::{Result, SyncError};
use super::filter::ExclusionRules;
use super::fingerprint::is_directory_path;
use super::plan::{build_plan, Controller, TaskKind, TransferTask};
use super::snapshot::SnapshotBuilder;
use super::state::{apply_overrides, rewrite_rule, PreviousSnapshot, StateStore};
use super::status::{Lease, StatusGate, SyncStatus};
use super::tree::{Category, FileList};
use crate::config::Settings;
use crate::storage::{join_remote, DeleteStatus, LocalVault, RemoteStorage};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// 构造同步服务所需的全部依赖
pub struct SyncContext {
    pub settings: Settings,
    pub local: Arc<dyn LocalVault>,
    pub remote: Arc<dyn RemoteStorage>,
    pub state: StateStore,
}

/// 同步选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// 忽略快照错误标记
    pub force: bool,
    /// 由调度器触发
    pub auto: bool,
}

/// 同步报告
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub downloaded: usize,
    pub uploaded: usize,
    pub deleted_local: usize,
    pub deleted_remote: usize,
    /// 失败的路径及原因
    pub errors: Vec<String>,
    /// 传输后重新检查得到的剩余差异
    pub remaining: DiffSummary,
    pub duration_ms: u64,
}

impl SyncOutcome {
    fn record_success(&mut self, kind: TaskKind) {
        match kind {
            TaskKind::Download => self.downloaded += 1,
            TaskKind::Upload => self.uploaded += 1,
            TaskKind::DeleteLocal => self.deleted_local += 1,
            TaskKind::DeleteRemote => self.deleted_remote += 1,
        }
    }

    fn record_failure(&mut self, kind: TaskKind, path: &str, e: anyhow::Error) {
        warn!("{}失败: {} - {:#}", kind, path, e);
        self.errors.push(format!("{} {}: {:#}", kind, path, e));
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "下载 {}, 上传 {}, 删除本地 {}, 删除远程 {}, 失败 {}, 耗时 {}ms",
            self.downloaded,
            self.uploaded,
            self.deleted_local,
            self.deleted_remote,
            self.errors.len(),
            self.duration_ms
        )
    }
}

/// 同步服务
///
/// 所有入口都先经过状态闸门，同一时刻只有一个操作在运行。
pub struct SyncService {
    settings: Settings,
    local: Arc<dyn LocalVault>,
    remote: Arc<dyn RemoteStorage>,
    snapshots: SnapshotBuilder,
    differ: TreeDiffer,
    gate: StatusGate,
    state: Mutex<StateStore>,
    cached: Mutex<Option<DiffResult>>,
    /// 用户处理过的本地冲突，下次保存时按改写表修正
    overrides: Mutex<BTreeMap<String, Category>>,
}

impl SyncService {
    pub fn new(context: SyncContext) -> Self {
        let SyncContext {
            settings,
            local,
            remote,
            state,
        } = context;

        let rules = ExclusionRules::from_settings(&settings.exclusion, settings.platform);
        let snapshots = SnapshotBuilder::new(rules, settings.hash_concurrency);

        Self {
            settings,
            local,
            remote,
            snapshots,
            differ: TreeDiffer::new(),
            gate: StatusGate::default(),
            state: Mutex::new(state),
            cached: Mutex::new(None),
            overrides: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.gate.current()
    }

    pub fn gate(&self) -> &StatusGate {
        &self.gate
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn rules(&self) -> &ExclusionRules {
        self.snapshots.rules()
    }

    /// 持久化快照是否带有错误标记
    pub async fn has_error(&self) -> bool {
        self.state.lock().await.snapshot().error
    }

    pub async fn previous(&self) -> PreviousSnapshot {
        self.state.lock().await.snapshot().clone()
    }

    pub async fn cached_diff(&self) -> Option<DiffResult> {
        self.cached.lock().await.clone()
    }

    fn remote_path(&self, path: &str) -> String {
        join_remote(&self.settings.remote_dir, path)
    }

    /// 连通性探测：固定次数、固定超时、线性退避
    async fn probe(&self) -> Result<()> {
        let probe = &self.settings.probe;
        let mut last_error = String::new();

        for attempt in 1..=probe.attempts {
            match tokio::time::timeout(probe.timeout(), self.remote.exists("")).await {
                Ok(Ok(_)) => {
                    debug!("远程可访问: {}", self.remote.name());
                    return Ok(());
                }
                Ok(Err(e)) => last_error = format!("{:#}", e),
                Err(_) => last_error = format!("超时 ({}秒)", probe.timeout_secs),
            }

            if attempt < probe.attempts {
                let delay = probe.backoff(attempt);
                warn!(
                    "连接探测失败，{}ms 后重试 ({}/{}): {}",
                    delay.as_millis(),
                    attempt,
                    probe.attempts,
                    last_error
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!("远程不可访问，已离线: {}", last_error);
        Err(SyncError::Connectivity(last_error))
    }

    /// 测试远程连接
    pub async fn test_connection(&self) -> Result<()> {
        let lease = self.gate.begin(SyncStatus::Testing)?;
        match self.probe().await {
            Ok(()) => {
                info!("远程连接正常: {}", self.remote.name());
                lease.finish(SyncStatus::Idle);
                Ok(())
            }
            Err(e) => {
                lease.finish(SyncStatus::Offline);
                Err(e)
            }
        }
    }

    /// 检查两侧差异并缓存结果
    pub async fn check(&self) -> Result<DiffResult> {
        let lease = self.gate.begin(SyncStatus::Checking)?;
        if let Err(e) = self.probe().await {
            lease.finish(SyncStatus::Offline);
            return Err(e);
        }

        let diff = self.run_check().await?;
        lease.finish(SyncStatus::Idle);
        Ok(diff)
    }

    async fn run_check(&self) -> Result<DiffResult> {
        let (local, remote) = tokio::join!(
            self.snapshots.build_local(self.local.clone(), true),
            self.snapshots
                .build_remote(self.remote.as_ref(), &self.settings.remote_dir),
        );
        let local = local.map_err(SyncError::Local)?;
        let remote = remote.map_err(SyncError::Remote)?;

        let diff = {
            let state = self.state.lock().await;
            self.differ.compare(state.snapshot(), &local, &remote)
        };

        info!("检查完成: {}", diff.summarize());
        *self.cached.lock().await = Some(diff.clone());
        Ok(diff)
    }

    /// 按控制器执行一次同步
    pub async fn sync(&self, controller: &Controller, options: SyncOptions) -> Result<SyncOutcome> {
        let status = if options.auto {
            SyncStatus::AutoSyncing
        } else {
            controller.status()
        };
        let lease = self.gate.begin(status)?;
        let started = Instant::now();

        if let Err(e) = self.probe().await {
            lease.finish(SyncStatus::Offline);
            return Err(e);
        }

        {
            let mut state = self.state.lock().await;
            if state.snapshot().error {
                if !options.force {
                    info!("快照带有错误标记，拒绝同步");
                    return Err(SyncError::StateFlagged);
                }
                warn!("强制同步，清除快照错误标记");
                state.set_error(false).map_err(SyncError::State)?;
            }
        }

        let cached = self.cached.lock().await.take();
        let diff = match cached {
            Some(diff) => diff,
            None => self.run_check().await?,
        };

        let tasks = build_plan(&diff, controller);
        info!("{} 共 {} 个任务", status.message(), tasks.len());

        let mut outcome = SyncOutcome::default();
        for task in &tasks {
            self.execute(task, &mut outcome).await;
        }

        // 传输已经发生，之后的失败都会让快照不可信
        let remaining = match self.run_check().await {
            Ok(diff) => diff.summarize(),
            Err(e) => return Err(self.fail_planning(lease, e).await),
        };

        lease.update(SyncStatus::Saving);
        if let Err(e) = self.save_snapshot().await {
            return Err(self.fail_planning(lease, e).await);
        }

        outcome.remaining = remaining;
        outcome.duration_ms = started.elapsed().as_millis() as u64;
        info!("同步完成: {}", outcome);
        lease.finish(SyncStatus::Idle);
        Ok(outcome)
    }

    async fn fail_planning(&self, lease: Lease, e: SyncError) -> SyncError {
        error!("同步后处理失败，已设置错误标记: {}", e);
        // 缓存的是传输前的差异
        self.cached.lock().await.take();
        if let Err(persist) = self.state.lock().await.set_error(true) {
            error!("写入错误标记失败: {:#}", persist);
        }
        lease.finish(SyncStatus::Error);
        SyncError::Planning(e.to_string())
    }

    /// 执行单个传输任务。单个文件失败只记录，不中断批次
    async fn execute(&self, task: &TransferTask, outcome: &mut SyncOutcome) {
        let (dirs, files): (Vec<&String>, Vec<&String>) =
            task.paths.keys().partition(|path| is_directory_path(path));

        info!(
            "{} ({} {}): {} 个目录, {} 个文件",
            task.kind,
            task.side,
            task.category,
            dirs.len(),
            files.len()
        );

        match task.kind {
            TaskKind::Upload => {
                for dir in dirs {
                    if let Err(e) = self.remote.create_dir(&self.remote_path(dir)).await {
                        outcome.record_failure(task.kind, dir, e);
                    }
                }
                // 上传逐个进行
                for path in files {
                    match self.upload(path).await {
                        Ok(()) => outcome.record_success(task.kind),
                        Err(e) => outcome.record_failure(task.kind, path, e),
                    }
                }
            }
            TaskKind::Download => {
                for dir in dirs {
                    if let Err(e) = self.local.create_folder(dir).await {
                        outcome.record_failure(task.kind, dir, e);
                    }
                }
                let results = join_all(files.iter().map(|path| self.download(path))).await;
                for (path, result) in files.into_iter().zip(results) {
                    match result {
                        Ok(()) => outcome.record_success(task.kind),
                        Err(e) => outcome.record_failure(task.kind, path, e),
                    }
                }
            }
            TaskKind::DeleteLocal | TaskKind::DeleteRemote => {
                let paths: Vec<&String> = files.into_iter().chain(dirs).collect();
                self.delete_all(task.kind, paths, outcome).await;
            }
        }
    }

    async fn upload(&self, path: &str) -> anyhow::Result<()> {
        let data = self.local.read(path).await?;
        debug!("上传: {} ({}字节)", path, data.len());
        self.remote.put(&self.remote_path(path), data).await
    }

    async fn download(&self, path: &str) -> anyhow::Result<()> {
        let data = self.remote.get(&self.remote_path(path)).await?;
        debug!("下载: {} ({}字节)", path, data.len());
        self.local.write(path, &data).await
    }

    /// 两阶段删除：全部尝试一次，失败的先确认是否仍存在再重试一次
    async fn delete_all(&self, kind: TaskKind, paths: Vec<&String>, outcome: &mut SyncOutcome) {
        let first = join_all(paths.iter().map(|path| self.delete_path(kind, path))).await;

        let mut failed = Vec::new();
        for (path, result) in paths.into_iter().zip(first) {
            match result {
                Ok(()) => outcome.record_success(kind),
                Err(e) => {
                    debug!("删除失败，稍后重试: {} - {:#}", path, e);
                    failed.push(path);
                }
            }
        }

        if failed.is_empty() {
            return;
        }

        info!("重试 {} 个失败的删除", failed.len());
        let second = join_all(failed.iter().map(|path| self.retry_delete(kind, path))).await;
        for (path, result) in failed.into_iter().zip(second) {
            match result {
                Ok(()) => outcome.record_success(kind),
                Err(e) => outcome.record_failure(kind, path, e),
            }
        }
    }

    async fn delete_path(&self, kind: TaskKind, path: &str) -> anyhow::Result<()> {
        match kind {
            TaskKind::DeleteLocal => self.local.trash(path).await,
            _ => {
                if self.remote.delete(&self.remote_path(path)).await? == DeleteStatus::NotFound {
                    debug!("远程已不存在: {}", path);
                }
                Ok(())
            }
        }
    }

    async fn retry_delete(&self, kind: TaskKind, path: &str) -> anyhow::Result<()> {
        let exists = match kind {
            TaskKind::DeleteLocal => self.local.exists(path).await?,
            _ => self.remote.exists(&self.remote_path(path)).await?,
        };
        if !exists {
            debug!("已不存在，视为删除成功: {}", path);
            return Ok(());
        }
        self.delete_path(kind, path).await
    }

    /// 保存当前本地状态为新的一致快照
    pub async fn save(&self) -> Result<PreviousSnapshot> {
        let lease = self.begin_save().await?;
        let snapshot = self.save_snapshot().await?;
        lease.finish(SyncStatus::Idle);
        Ok(snapshot)
    }

    /// 进入保存状态。忙碌或带有错误标记时拒绝
    async fn begin_save(&self) -> Result<Lease> {
        let lease = self.gate.begin(SyncStatus::Saving)?;
        if self.has_error().await {
            info!("快照带有错误标记，拒绝保存");
            return Err(SyncError::StateFlagged);
        }
        Ok(lease)
    }

    async fn save_snapshot(&self) -> Result<PreviousSnapshot> {
        let mut files = self
            .snapshots
            .build_local(self.local.clone(), false)
            .await
            .map_err(SyncError::Local)?;

        let cached = self.cached.lock().await.take();
        let mut overrides = self.overrides.lock().await;
        let mut state = self.state.lock().await;
        let previous = state.snapshot();

        apply_overrides(&mut files, &previous.files, &overrides);

        // 最近一次检查的冲突已经包含延续下来且未收敛的旧冲突
        let open = match &cached {
            Some(diff) => &diff.local_files.except,
            None => &previous.except,
        };
        let except: FileList = open
            .keys()
            .filter_map(|path| files.get(path).map(|fp| (path.clone(), fp.clone())))
            .collect();

        let snapshot = PreviousSnapshot {
            date: Utc::now(),
            error: previous.error,
            files,
            except,
        };
        state.replace(snapshot.clone()).map_err(SyncError::State)?;
        overrides.clear();

        info!(
            "快照已保存: {} 个条目, {} 个冲突",
            snapshot.files.len(),
            snapshot.except.len()
        );
        Ok(snapshot)
    }

    /// 记录用户对本地冲突的处理并保存快照
    pub async fn resolve_conflict(&self, path: &str, category: Category) -> Result<PreviousSnapshot> {
        if rewrite_rule(category).is_none() {
            return Err(SyncError::Invalid(format!(
                "{} 只能按 added/deleted/modified 处理",
                path
            )));
        }

        // 拒绝时不留下任何处理记录
        let lease = self.begin_save().await?;
        self.overrides
            .lock()
            .await
            .insert(path.to_string(), category);
        info!("记录冲突处理: {} -> {}", path, category);

        match self.save_snapshot().await {
            Ok(snapshot) => {
                lease.finish(SyncStatus::Idle);
                Ok(snapshot)
            }
            Err(e) => {
                self.overrides.lock().await.remove(path);
                Err(e)
            }
        }
    }

    /// 清除错误状态与持久化的错误标记
    pub async fn clear_error(&self) -> Result<bool> {
        match self.gate.current() {
            status if status.is_ready() => {}
            SyncStatus::Error | SyncStatus::Paused => {}
            busy => return Err(SyncError::Busy(busy)),
        }

        let gate_cleared = self.gate.clear_error();
        let mut state = self.state.lock().await;
        let flagged = state.snapshot().error;
        state.set_error(false).map_err(SyncError::State)?;

        if gate_cleared || flagged {
            info!("已清除错误标记");
        }
        Ok(gate_cleared || flagged)
    }

    pub fn toggle_pause(&self) -> Result<SyncStatus> {
        self.gate.toggle_pause()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProbeSettings;
    use crate::core::fingerprint::fingerprint;
    use crate::storage::memory::MemoryRemote;
    use crate::storage::FsVault;
    use tempfile::TempDir;

    struct Fixture {
        _vault_dir: TempDir,
        config_dir: TempDir,
        vault: Arc<FsVault>,
        remote: Arc<MemoryRemote>,
        service: SyncService,
    }

    impl Fixture {
        fn new() -> Self {
            let vault_dir = tempfile::tempdir().unwrap();
            let config_dir = tempfile::tempdir().unwrap();
            let vault = Arc::new(FsVault::new(vault_dir.path()).unwrap());
            let remote = Arc::new(MemoryRemote::new());
            let service = Self::service(&vault, &remote, &config_dir);
            Self {
                _vault_dir: vault_dir,
                config_dir,
                vault,
                remote,
                service,
            }
        }

        fn service(vault: &Arc<FsVault>, remote: &Arc<MemoryRemote>, config_dir: &TempDir) -> SyncService {
            let settings = Settings {
                local_root: vault.base_path().to_path_buf(),
                remote_dir: "vault/".to_string(),
                probe: ProbeSettings {
                    attempts: 2,
                    timeout_secs: 1,
                    backoff_ms: 0,
                },
                ..Default::default()
            };
            SyncService::new(SyncContext {
                settings,
                local: vault.clone(),
                remote: remote.clone(),
                state: StateStore::load(config_dir.path()),
            })
        }

        /// 模拟进程重启
        fn restart(&mut self) {
            self.service = Self::service(&self.vault, &self.remote, &self.config_dir);
        }

        async fn bootstrap(&self) {
            self.vault.write("a.md", b"alpha").await.unwrap();
            self.vault.write("notes/b.md", b"beta").await.unwrap();
            let options = SyncOptions {
                force: true,
                auto: false,
            };
            self.service.sync(&Controller::push(), options).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_bootstrap_push_reaches_fixed_point() {
        let mut fx = Fixture::new();
        fx.bootstrap().await;

        assert_eq!(fx.remote.contents("vault/a.md").unwrap(), b"alpha");
        assert_eq!(fx.remote.contents("vault/notes/b.md").unwrap(), b"beta");
        assert!(fx.remote.has_dir("vault/notes/"));

        let previous = fx.service.previous().await;
        assert!(!previous.error);
        assert_eq!(previous.files["a.md"], fingerprint(b"alpha"));
        assert!(previous.files.contains_key("notes/"));

        fx.restart();
        let diff = fx.service.check().await.unwrap();
        assert!(diff.is_empty(), "{:?}", diff);
        assert_eq!(fx.service.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_first_sync_requires_force() {
        let fx = Fixture::new();
        fx.vault.write("a.md", b"alpha").await.unwrap();

        let result = fx.service.sync(&Controller::sync(), SyncOptions::default()).await;
        assert!(matches!(result, Err(SyncError::StateFlagged)));
        assert!(fx.remote.contents("vault/a.md").is_none());
        assert!(matches!(fx.service.save().await, Err(SyncError::StateFlagged)));
        assert_eq!(fx.service.status(), SyncStatus::Idle);

        assert!(fx.service.clear_error().await.unwrap());
        assert!(!fx.service.has_error().await);
        fx.service.save().await.unwrap();
    }

    #[tokio::test]
    async fn test_sync_applies_both_sides() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.remote.insert("vault/a.md", b"alpha v2");
        fx.remote.insert("vault/remote.md", b"from remote");
        fx.vault.write("local.md", b"from local").await.unwrap();

        let outcome = fx
            .service
            .sync(&Controller::sync(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.downloaded, 2);
        assert_eq!(outcome.uploaded, 1);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.remaining, DiffSummary::default());
        assert_eq!(fx.vault.read("a.md").await.unwrap(), b"alpha v2");
        assert_eq!(fx.vault.read("remote.md").await.unwrap(), b"from remote");
        assert_eq!(fx.remote.contents("vault/local.md").unwrap(), b"from local");
    }

    #[tokio::test]
    async fn test_deletion_propagates_to_remote() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.vault.trash("a.md").await.unwrap();
        let outcome = fx
            .service
            .sync(&Controller::sync(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.deleted_remote, 1);
        assert!(fx.remote.contents("vault/a.md").is_none());
        assert!(!fx.service.previous().await.files.contains_key("a.md"));
    }

    #[tokio::test]
    async fn test_conflict_is_flagged_then_resolved_by_pull() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.vault.write("a.md", b"local edit").await.unwrap();
        fx.remote.insert("vault/a.md", b"remote edit");

        let outcome = fx
            .service
            .sync(&Controller::sync(), SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.downloaded + outcome.uploaded, 0);
        assert_eq!(outcome.remaining.conflict_count(), 1);
        assert_eq!(fx.vault.read("a.md").await.unwrap(), b"local edit");
        assert_eq!(fx.remote.contents("vault/a.md").unwrap(), b"remote edit");
        assert!(fx.service.previous().await.except.contains_key("a.md"));

        // 拉取会覆盖冲突文件，两侧一致后冲突消失
        let outcome = fx
            .service
            .sync(&Controller::pull(), SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.downloaded, 1);
        assert_eq!(fx.vault.read("a.md").await.unwrap(), b"remote edit");
        assert!(fx.service.previous().await.except.is_empty());
        assert!(fx.service.check().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_retried_once() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.vault.trash("a.md").await.unwrap();
        fx.vault.trash("notes/b.md").await.unwrap();
        fx.remote.fail_deletes("vault/a.md", 1);
        fx.remote.fail_deletes("vault/notes/b.md", 2);

        let outcome = fx
            .service
            .sync(&Controller::push(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.deleted_remote, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("notes/b.md"));
        assert!(fx.remote.contents("vault/a.md").is_none());
        assert!(fx.remote.contents("vault/notes/b.md").is_some());
        assert_eq!(fx.service.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_uploads_are_sequential_in_order() {
        let fx = Fixture::new();
        for name in ["c.md", "a.md", "b.md"] {
            fx.vault.write(name, name.as_bytes()).await.unwrap();
        }
        let options = SyncOptions {
            force: true,
            auto: false,
        };
        fx.service.sync(&Controller::push(), options).await.unwrap();

        assert_eq!(
            fx.remote.puts(),
            vec!["vault/a.md", "vault/b.md", "vault/c.md"]
        );
    }

    #[tokio::test]
    async fn test_busy_gate_refuses_without_side_effects() {
        let fx = Fixture::new();
        fx.bootstrap().await;
        fx.vault.write("new.md", b"new").await.unwrap();

        let lease = fx.service.gate().begin(SyncStatus::Syncing).unwrap();
        let result = fx.service.sync(&Controller::push(), SyncOptions::default()).await;
        assert!(matches!(result, Err(SyncError::Busy(SyncStatus::Syncing))));
        assert!(matches!(fx.service.check().await, Err(SyncError::Busy(_))));
        assert!(fx.remote.contents("vault/new.md").is_none());
        drop(lease);

        assert!(fx.service.check().await.is_ok());
    }

    #[tokio::test]
    async fn test_offline_then_recovers() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.remote.set_offline(true);
        let result = fx.service.check().await;
        assert!(matches!(result, Err(SyncError::Connectivity(_))));
        assert_eq!(fx.service.status(), SyncStatus::Offline);
        assert!(fx.service.test_connection().await.is_err());

        fx.remote.set_offline(false);
        assert!(fx.service.check().await.is_ok());
        assert_eq!(fx.service.status(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_paused_blocks_sync() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        assert_eq!(fx.service.toggle_pause().unwrap(), SyncStatus::Paused);
        let options = SyncOptions {
            force: false,
            auto: true,
        };
        assert!(matches!(
            fx.service.sync(&Controller::sync(), options).await,
            Err(SyncError::Paused)
        ));
        assert_eq!(fx.service.toggle_pause().unwrap(), SyncStatus::Idle);
    }

    #[tokio::test]
    async fn test_resolve_modified_keeps_previous_fingerprint() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.vault.write("a.md", b"local edit").await.unwrap();
        let snapshot = fx
            .service
            .resolve_conflict("a.md", Category::Modified)
            .await
            .unwrap();
        assert_eq!(snapshot.files["a.md"], fingerprint(b"alpha"));

        // 修改仍然可见，留到下次同步处理
        let diff = fx.service.check().await.unwrap();
        assert!(diff.local_files.modified.contains_key("a.md"));

        assert!(matches!(
            fx.service.resolve_conflict("a.md", Category::Except).await,
            Err(SyncError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_resolve_leaves_no_override() {
        let fx = Fixture::new();
        fx.bootstrap().await;
        fx.vault.write("a.md", b"local edit").await.unwrap();

        let lease = fx.service.gate().begin(SyncStatus::Syncing).unwrap();
        assert!(matches!(
            fx.service.resolve_conflict("a.md", Category::Modified).await,
            Err(SyncError::Busy(SyncStatus::Syncing))
        ));
        drop(lease);

        fx.service.toggle_pause().unwrap();
        assert!(matches!(
            fx.service.resolve_conflict("a.md", Category::Modified).await,
            Err(SyncError::Paused)
        ));
        fx.service.toggle_pause().unwrap();

        let snapshot = fx.service.save().await.unwrap();
        assert_eq!(snapshot.files["a.md"], fingerprint(b"local edit"));
    }

    #[tokio::test]
    async fn test_failure_after_transfers_sets_sticky_error() {
        let fx = Fixture::new();
        fx.bootstrap().await;
        fx.vault.write("c.md", b"gamma").await.unwrap();

        // 第一次列表用于规划，传输后的复查失败
        fx.remote.fail_lists_after(1);
        let result = fx.service.sync(&Controller::push(), SyncOptions::default()).await;
        assert!(matches!(result, Err(SyncError::Planning(_))));
        assert_eq!(fx.service.status(), SyncStatus::Error);
        assert_eq!(fx.remote.contents("vault/c.md").unwrap(), b"gamma");
        assert!(StateStore::load(fx.config_dir.path()).snapshot().error);

        fx.remote.allow_lists();
        assert!(matches!(
            fx.service.sync(&Controller::push(), SyncOptions::default()).await,
            Err(SyncError::StateFlagged)
        ));
        assert!(matches!(fx.service.save().await, Err(SyncError::StateFlagged)));
        assert!(matches!(fx.service.check().await, Err(SyncError::StateFlagged)));

        assert!(fx.service.clear_error().await.unwrap());
        assert_eq!(fx.service.status(), SyncStatus::Idle);
        assert!(!StateStore::load(fx.config_dir.path()).snapshot().error);

        // 两侧都新增了相同内容，不需要再传输
        let outcome = fx
            .service
            .sync(&Controller::push(), SyncOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.uploaded, 0);
        assert_eq!(
            fx.service.previous().await.files["c.md"],
            fingerprint(b"gamma")
        );
    }

    #[tokio::test]
    async fn test_delete_counts_as_done_when_path_vanished() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.vault.trash("a.md").await.unwrap();
        // 删除生效但响应丢失；如果重试再次删除也会报错
        fx.remote.lose_delete_responses("vault/a.md", 2);

        let outcome = fx
            .service
            .sync(&Controller::push(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.deleted_remote, 1);
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert!(fx.remote.contents("vault/a.md").is_none());
        assert!(!fx.service.previous().await.files.contains_key("a.md"));
    }

    #[tokio::test]
    async fn test_inverted_pull_reverts_remote_addition() {
        let fx = Fixture::new();
        fx.bootstrap().await;

        fx.remote.insert("vault/stray.md", b"stray");
        let outcome = fx
            .service
            .sync(&Controller::pull_inverted(), SyncOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.deleted_remote, 1);
        assert!(fx.remote.contents("vault/stray.md").is_none());
        assert!(!fx.vault.exists("stray.md").await.unwrap());
    }
}
