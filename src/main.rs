use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;
use vaultsync_lib::commands::{self, sync::Preset};
use vaultsync_lib::core::Category;
use vaultsync_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use vaultsync_lib::{AppState, SyncService};

#[derive(Parser)]
#[command(name = "vaultsync", version, about = "本地库与 WebDAV 远程的三方同步")]
struct Cli {
    /// 配置目录（默认使用系统配置目录下的 vaultsync）
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(flatten)]
    Sync(SyncCommand),
    /// 查看或修改日志配置
    Log {
        #[arg(long)]
        enabled: Option<bool>,
        #[arg(long)]
        max_size_mb: Option<u32>,
        #[arg(long)]
        level: Option<String>,
    },
}

#[derive(Subcommand)]
enum SyncCommand {
    /// 检查两侧差异
    Check,
    /// 拉取远程的全部变化
    Pull,
    /// 推送本地的全部变化
    Push,
    /// 双向同步（冲突不处理）
    Sync {
        /// 忽略快照错误标记
        #[arg(long)]
        force: bool,
    },
    /// 撤销远程的新增与删除
    PullInverted,
    /// 撤销本地的新增与删除
    PushInverted,
    /// 保存当前本地状态为一致快照
    Save,
    /// 清除错误标记
    ClearError,
    /// 测试远程连接
    Test,
    /// 记录本地冲突的处理方式并保存快照
    Resolve {
        path: String,
        #[arg(value_parser = commands::sync::parse_resolution)]
        resolution: Category,
    },
    /// 按配置运行定时同步与实时同步，直到 Ctrl-C
    Watch,
}

/// 初始化日志系统
fn init_logging(config_dir: &Path) {
    let log_dir = get_log_dir(config_dir);
    let config = LogConfig::load(&log_dir);

    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    let level = config.tracing_level().as_str().to_lowercase();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,reqwest=warn,opendal=warn", level))
    });

    match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            let console_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
        Err(e) => {
            // 文件日志创建失败，只输出到控制台
            let console_layer = tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);
            let subscriber = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer);
            let _ = tracing::subscriber::set_global_default(subscriber);
            tracing::warn!("无法创建日志文件: {}", e);
        }
    }
}

async fn run(command: Command, config_dir: PathBuf) -> Result<String, String> {
    match command {
        // 日志配置不需要连接远程
        Command::Log {
            enabled,
            max_size_mb,
            level,
        } => {
            let config = if enabled.is_none() && max_size_mb.is_none() && level.is_none() {
                commands::log::get_log_config(&config_dir)
            } else {
                commands::log::set_log_config(&config_dir, enabled, max_size_mb, level)?
            };
            serde_json::to_string_pretty(&config).map_err(|e| e.to_string())
        }
        Command::Sync(command) => {
            let state = AppState::new(config_dir).map_err(|e| format!("{:#}", e))?;
            run_sync_command(command, &state).await
        }
    }
}

async fn run_sync_command(command: SyncCommand, state: &AppState) -> Result<String, String> {
    let service = state.service.as_ref();

    match command {
        SyncCommand::Check => {
            let diff = commands::sync::check(service).await?;
            Ok(diff.summarize().to_string())
        }
        SyncCommand::Pull => sync_summary(service, Preset::Pull, false).await,
        SyncCommand::Push => sync_summary(service, Preset::Push, false).await,
        SyncCommand::Sync { force } => sync_summary(service, Preset::Sync, force).await,
        SyncCommand::PullInverted => sync_summary(service, Preset::PullInverted, false).await,
        SyncCommand::PushInverted => sync_summary(service, Preset::PushInverted, false).await,
        SyncCommand::Save => {
            let snapshot = commands::sync::save(service).await?;
            Ok(format!(
                "快照已保存: {} 个条目, {} 个冲突",
                snapshot.files.len(),
                snapshot.except.len()
            ))
        }
        SyncCommand::ClearError => {
            let cleared = commands::sync::clear_error(service).await?;
            Ok(if cleared { "已清除错误标记" } else { "没有错误标记" }.to_string())
        }
        SyncCommand::Test => {
            let result = commands::test::test_connection(service).await;
            if result.success {
                Ok(result.to_string())
            } else {
                Err(result.to_string())
            }
        }
        SyncCommand::Resolve { path, resolution } => {
            let snapshot = commands::sync::resolve(service, &path, resolution).await?;
            Ok(format!(
                "已记录 {} -> {}, 快照 {} 个条目",
                path,
                resolution,
                snapshot.files.len()
            ))
        }
        SyncCommand::Watch => {
            let runs = commands::sync::watch(state).await?;
            Ok(format!("调度器已停止，共执行 {} 次自动同步", runs))
        }
    }
}

async fn sync_summary(
    service: &SyncService,
    preset: Preset,
    force: bool,
) -> Result<String, String> {
    let outcome = commands::sync::start_sync(service, preset, force).await?;
    for error in &outcome.errors {
        eprintln!("  {}", error);
    }
    Ok(format!("{} | 剩余: {}", outcome, outcome.remaining))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_dir = vaultsync_lib::config_dir(cli.config_dir);
    let _ = std::fs::create_dir_all(&config_dir);
    init_logging(&config_dir);

    match run(cli.command, config_dir).await {
        Ok(summary) => {
            println!("{}", summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
