//! 应用配置模块
//!
//! 配置保存在 `config.json` 的 `sync` 段，字段缺失时使用默认值。

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 运行平台，决定隐式排除哪个隐藏目录
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

/// 排除规则配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExclusionSettings {
    pub directories: Vec<String>,
    pub extensions: Vec<String>,
    pub markers: Vec<String>,
    /// 关闭全部排除规则
    pub override_all: bool,
    /// 应用配置目录名
    pub config_dir_name: String,
    pub skip_hidden_desktop: bool,
    pub skip_hidden_mobile: bool,
}

impl Default for ExclusionSettings {
    fn default() -> Self {
        Self {
            directories: vec![
                ".git".to_string(),
                ".trash".to_string(),
                "node_modules".to_string(),
            ],
            extensions: vec![],
            markers: vec![],
            override_all: false,
            config_dir_name: ".obsidian".to_string(),
            skip_hidden_desktop: false,
            skip_hidden_mobile: true,
        }
    }
}

/// 连通性探测配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProbeSettings {
    /// 尝试次数
    pub attempts: u32,
    /// 每次尝试的超时（秒）
    pub timeout_secs: u64,
    /// 线性退避步长（毫秒）：第 n 次失败后等待 n * backoff_ms
    pub backoff_ms: u64,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            timeout_secs: 10,
            backoff_ms: 1000,
        }
    }
}

impl ProbeSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms * attempt as u64)
    }
}

/// 同步配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// 本地库根目录
    pub local_root: PathBuf,
    /// WebDAV 服务地址
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// 远程库所在目录（相对服务地址），以 `/` 结尾
    pub remote_dir: String,
    /// 列表中携带内容指纹的属性
    pub checksum_namespace: String,
    pub checksum_property: String,
    pub platform: Platform,
    pub exclusion: ExclusionSettings,
    /// 本地快照的哈希并发数
    pub hash_concurrency: usize,
    pub probe: ProbeSettings,
    /// 自动同步间隔（秒），0 表示关闭
    pub auto_sync_interval_secs: u64,
    /// 本地变化后自动同步
    pub live_sync: bool,
    pub live_sync_debounce_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            local_root: PathBuf::from("."),
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            remote_dir: "vault/".to_string(),
            checksum_namespace: "urn:vaultsync:props".to_string(),
            checksum_property: "checksum".to_string(),
            platform: Platform::default(),
            exclusion: ExclusionSettings::default(),
            hash_concurrency: 15,
            probe: ProbeSettings::default(),
            auto_sync_interval_secs: 0,
            live_sync: false,
            live_sync_debounce_ms: 2000,
        }
    }
}

impl Settings {
    /// 从配置文件加载同步配置，读取失败时使用默认值
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join(CONFIG_FILE);
        fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| config.get("sync").cloned())
            .and_then(|section| match serde_json::from_value::<Settings>(section) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::warn!("同步配置解析失败，使用默认值: {}", e);
                    None
                }
            })
            .unwrap_or_default()
            .normalized()
    }

    /// 保存同步配置，保留文件中的其它段
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let config_file = config_dir.join(CONFIG_FILE);

        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        config["sync"] = serde_json::to_value(self)?;
        fs::write(&config_file, serde_json::to_string_pretty(&config)?)
    }

    /// 规范化远程目录：无前导 `/`，以 `/` 结尾（根目录为空串）
    fn normalized(mut self) -> Self {
        let dir = self.remote_dir.trim_matches('/');
        self.remote_dir = if dir.is_empty() {
            String::new()
        } else {
            format!("{}/", dir)
        };
        if self.hash_concurrency == 0 {
            self.hash_concurrency = 1;
        }
        if self.probe.attempts == 0 {
            self.probe.attempts = 1;
        }
        self
    }

    pub fn live_sync_debounce(&self) -> Duration {
        Duration::from_millis(self.live_sync_debounce_ms)
    }

    pub fn auto_sync_interval(&self) -> Option<Duration> {
        (self.auto_sync_interval_secs > 0)
            .then(|| Duration::from_secs(self.auto_sync_interval_secs))
    }
}
