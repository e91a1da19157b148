use super::{Listing, LocalVault};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 回收站目录（位于库根）
pub const TRASH_DIR: &str = ".trash";

/// 基于本地文件系统的库
pub struct FsVault {
    base_path: PathBuf,
    name: String,
}

impl FsVault {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_end_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 把绝对路径转换为库内相对路径（统一使用 /）
    pub fn relative_path(&self, full: &Path) -> Option<String> {
        let relative = full.strip_prefix(&self.base_path).ok()?.to_str()?;
        let relative = relative.replace('\\', "/");
        (!relative.is_empty()).then_some(relative)
    }

    /// 回收站中不重名的目标路径
    async fn trash_target(&self, path: &str) -> PathBuf {
        let trash_root = self.base_path.join(TRASH_DIR);
        let candidate = trash_root.join(path.trim_end_matches('/'));
        if fs::metadata(&candidate).await.is_err() {
            return candidate;
        }
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
        let mut name = candidate.as_os_str().to_owned();
        name.push(format!(".{}", stamp));
        PathBuf::from(name)
    }
}

#[async_trait]
impl LocalVault for FsVault {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = fs::read(self.resolve_path(path))
            .await
            .with_context(|| format!("读取失败: {}", path))?;
        Ok(data)
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 使用临时文件写入，然后原子重命名
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".vaultsync-tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Listing> {
        let dir = self.resolve_path(path);
        let mut listing = Listing::default();

        let mut entries = fs::read_dir(&dir)
            .await
            .with_context(|| format!("无法列出目录: {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            // 不跟随符号链接
            if file_type.is_symlink() {
                continue;
            }
            let Some(relative) = self.relative_path(&entry.path()) else {
                continue;
            };
            if file_type.is_dir() {
                listing.folders.push(format!("{}/", relative));
            } else {
                listing.files.push(relative);
            }
        }

        listing.files.sort();
        listing.folders.sort();
        Ok(listing)
    }

    async fn create_folder(&self, path: &str) -> Result<()> {
        fs::create_dir_all(self.resolve_path(path)).await?;
        Ok(())
    }

    async fn trash(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        if fs::metadata(&full_path).await.is_err() {
            anyhow::bail!("路径不存在: {}", path);
        }

        let target = self.trash_target(path).await;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&full_path, &target).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match fs::metadata(self.resolve_path(path)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
