//! 日志模块 - 提供文件日志和大小管理功能

use crate::config::CONFIG_FILE;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing_subscriber::fmt::MakeWriter;

/// 日志文件名
pub const LOG_FILE: &str = "vaultsync.log";

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 是否启用日志记录
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 最大日志文件大小（MB）
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u32,
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_enabled() -> bool {
    true
}

fn default_max_size_mb() -> u32 {
    5 // 默认 5MB
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_size_mb: default_max_size_mb(),
            level: default_level(),
        }
    }
}

impl LogConfig {
    /// 从配置文件的 `log` 段加载
    pub fn load(config_dir: &Path) -> Self {
        fs::read_to_string(config_dir.join(CONFIG_FILE))
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("log").cloned())
            .and_then(|log| serde_json::from_value::<LogConfig>(log).ok())
            .unwrap_or_default()
    }

    /// 保存日志配置，保留其它段
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let config_file = config_dir.join(CONFIG_FILE);

        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        config["log"] = serde_json::to_value(self)?;
        fs::write(&config_file, serde_json::to_string_pretty(&config)?)
    }

    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }
}

type SharedWriter = Arc<Mutex<Option<BufWriter<File>>>>;

fn lock(writer: &SharedWriter) -> MutexGuard<'_, Option<BufWriter<File>>> {
    writer.lock().unwrap_or_else(|e| e.into_inner())
}

/// 带大小限制的日志写入器，超过上限时把当前文件改名为 `.old` 后重新开始
#[derive(Clone)]
pub struct SizeRotatingWriter {
    file_path: PathBuf,
    max_size: u64,
    writer: SharedWriter,
}

impl SizeRotatingWriter {
    pub fn new(log_dir: &Path, max_size_mb: u32) -> io::Result<Self> {
        fs::create_dir_all(log_dir)?;

        let file_path = log_dir.join(LOG_FILE);
        let max_size = (max_size_mb as u64) * 1024 * 1024;
        let writer = open_file(&file_path, max_size)?;

        Ok(Self {
            file_path,
            max_size,
            writer: Arc::new(Mutex::new(Some(writer))),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }
}

fn open_file(file_path: &Path, max_size: u64) -> io::Result<BufWriter<File>> {
    if exceeds(file_path, max_size) {
        rotate_log(file_path)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(file_path)?;

    Ok(BufWriter::new(file))
}

fn exceeds(file_path: &Path, max_size: u64) -> bool {
    fs::metadata(file_path)
        .map(|metadata| metadata.len() > max_size)
        .unwrap_or(false)
}

/// 轮转日志文件：vaultsync.log -> vaultsync.log.old
fn rotate_log(file_path: &Path) -> io::Result<()> {
    let backup_path = file_path.with_extension("log.old");
    if backup_path.exists() {
        fs::remove_file(&backup_path)?;
    }
    fs::rename(file_path, &backup_path)
}

/// 超过上限时关闭、轮转并重新打开
fn rotate_if_needed(writer: &SharedWriter, file_path: &Path, max_size: u64) {
    if !exceeds(file_path, max_size) {
        return;
    }

    let mut guard = lock(writer);
    if let Some(mut current) = guard.take() {
        let _ = current.flush();
    }
    let _ = rotate_log(file_path);
    *guard = open_file(file_path, max_size).ok();
}

/// 单次写入使用的句柄
pub struct LogWriter {
    inner: SharedWriter,
    file_path: PathBuf,
    max_size: u64,
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = {
            let mut guard = lock(&self.inner);
            let writer = guard
                .as_mut()
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "日志文件不可用"))?;
            let written = writer.write(buf)?;
            writer.flush()?;
            written
        };

        rotate_if_needed(&self.inner, &self.file_path, self.max_size);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match lock(&self.inner).as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SizeRotatingWriter {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        rotate_if_needed(&self.writer, &self.file_path, self.max_size);

        LogWriter {
            inner: self.writer.clone(),
            file_path: self.file_path.clone(),
            max_size: self.max_size,
        }
    }
}

/// 日志目录（与配置目录相同）
pub fn get_log_dir(config_dir: &Path) -> PathBuf {
    config_dir.to_path_buf()
}
