//! 本地与远程快照构建

use super::filter::ExclusionRules;
use super::fingerprint::fingerprint;
use super::tree::{collect_entries, FileEntry, FileList};
use crate::storage::{LocalVault, RemoteStorage};
use anyhow::Result;
use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 默认哈希并发数
pub const DEFAULT_HASH_CONCURRENCY: usize = 15;

/// 快照构建器
pub struct SnapshotBuilder {
    rules: ExclusionRules,
    hash_concurrency: usize,
}

impl SnapshotBuilder {
    pub fn new(rules: ExclusionRules, hash_concurrency: usize) -> Self {
        Self {
            rules,
            hash_concurrency: hash_concurrency.max(1),
        }
    }

    pub fn rules(&self) -> &ExclusionRules {
        &self.rules
    }

    /// 构建本地快照。`filter_enabled` 为 false 时包含所有路径（保存快照时使用）
    pub async fn build_local(
        &self,
        vault: Arc<dyn LocalVault>,
        filter_enabled: bool,
    ) -> Result<FileList> {
        info!(
            "开始扫描本地: {} (过滤: {})",
            vault.name(),
            if filter_enabled { "开启" } else { "关闭" }
        );

        let mut files = Vec::new();
        let mut entries = Vec::new();
        self.walk(vault.clone(), String::new(), filter_enabled, &mut files, &mut entries)
            .await?;

        // 有界并发计算指纹；读取失败的文件只记录日志并跳过
        let hashed: Vec<Option<FileEntry>> = futures::stream::iter(files)
            .map(|path| {
                let vault = vault.clone();
                async move {
                    match vault.read(&path).await {
                        Ok(data) => Some(FileEntry::File {
                            fingerprint: fingerprint(&data),
                            path,
                        }),
                        Err(e) => {
                            warn!("读取文件失败，已跳过: {} - {:#}", path, e);
                            None
                        }
                    }
                }
            })
            .buffer_unordered(self.hash_concurrency)
            .collect()
            .await;

        entries.extend(hashed.into_iter().flatten());
        let list = collect_entries(entries);
        info!("本地扫描完成: {} 个条目", list.len());
        Ok(list)
    }

    /// 递归遍历目录：收集文件路径，目录直接生成条目。同层子目录并发展开
    fn walk<'a>(
        &'a self,
        vault: Arc<dyn LocalVault>,
        dir: String,
        filter_enabled: bool,
        files: &'a mut Vec<String>,
        entries: &'a mut Vec<FileEntry>,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let listing = vault.list(&dir).await?;

            for file in listing.files {
                if filter_enabled && self.rules.is_excluded(&file) {
                    debug!("排除文件: {}", file);
                    continue;
                }
                files.push(file);
            }

            let folders: Vec<String> = listing
                .folders
                .into_iter()
                .filter(|folder| {
                    let excluded = filter_enabled && self.rules.is_excluded(folder);
                    if excluded {
                        debug!("排除目录: {}", folder);
                    }
                    !excluded
                })
                .collect();

            let children = join_all(folders.iter().map(|folder| {
                let vault = vault.clone();
                let folder = folder.clone();
                async move {
                    let mut child_files = Vec::new();
                    let mut child_entries = Vec::new();
                    self.walk(vault, folder, filter_enabled, &mut child_files, &mut child_entries)
                        .await
                        .map(|_| (child_files, child_entries))
                }
            }))
            .await;

            for (folder, child) in folders.into_iter().zip(children) {
                let (child_files, child_entries) = child?;
                entries.push(FileEntry::Directory { path: folder });
                files.extend(child_files);
                entries.extend(child_entries);
            }

            Ok(())
        }
        .boxed()
    }

    /// 构建远程快照：确保根目录存在，一次无限深度列表，路径改写为相对 `root_path`
    pub async fn build_remote(
        &self,
        remote: &dyn RemoteStorage,
        root_path: &str,
    ) -> Result<FileList> {
        let root = root_path.trim_matches('/');
        let root_dir = if root.is_empty() {
            String::new()
        } else {
            format!("{}/", root)
        };

        info!("开始扫描远程: {} ({})", remote.name(), root_dir);

        if !root_dir.is_empty() && !remote.exists(&root_dir).await? {
            info!("远程目录不存在，自动创建: {}", root_dir);
            remote.create_dir(&root_dir).await?;
        }

        let listing = remote.list_recursive(&root_dir).await?;
        let mut entries = Vec::new();
        let mut excluded_count = 0;
        let mut missing_checksum = 0;

        for entry in listing {
            let Some(relative) = entry.path.strip_prefix(root_dir.as_str()) else {
                debug!("跳过根目录之外的条目: {}", entry.path);
                continue;
            };
            // 跳过根目录本身
            if relative.is_empty() || relative == "/" {
                continue;
            }
            if self.rules.is_excluded(relative) {
                excluded_count += 1;
                continue;
            }

            if entry.is_dir {
                let path = if relative.ends_with('/') {
                    relative.to_string()
                } else {
                    format!("{}/", relative)
                };
                entries.push(FileEntry::Directory { path });
            } else {
                if entry.checksum.is_none() {
                    missing_checksum += 1;
                }
                entries.push(FileEntry::File {
                    path: relative.to_string(),
                    fingerprint: entry.checksum.unwrap_or_default(),
                });
            }
        }

        if missing_checksum > 0 {
            // 没有指纹的文件无法和本地比较，会一直显示为已修改
            warn!(
                "{} 个远程文件缺少指纹属性，请确认服务端提供 blake3 指纹",
                missing_checksum
            );
        }

        let list = collect_entries(entries);
        info!(
            "远程扫描完成: {} 个条目, {} 个被排除",
            list.len(),
            excluded_count
        );
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExclusionSettings, Platform};
    use crate::storage::memory::MemoryRemote;
    use crate::storage::FsVault;

    fn builder() -> SnapshotBuilder {
        let settings = ExclusionSettings {
            extensions: vec!["tmp".to_string()],
            config_dir_name: ".obsidian".to_string(),
            skip_hidden_desktop: true,
            ..Default::default()
        };
        SnapshotBuilder::new(
            ExclusionRules::from_settings(&settings, Platform::Desktop),
            DEFAULT_HASH_CONCURRENCY,
        )
    }

    #[tokio::test]
    async fn test_local_snapshot_respects_filter() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(FsVault::new(dir.path()).unwrap());
        vault.write("a.md", b"alpha").await.unwrap();
        vault.write("notes/b.md", b"beta").await.unwrap();
        vault.write("notes/deep/c.md", b"gamma").await.unwrap();
        vault.write("scratch.tmp", b"x").await.unwrap();
        vault.write(".obsidian/app.json", b"{}").await.unwrap();

        let filtered = builder().build_local(vault.clone(), true).await.unwrap();
        let keys: Vec<&str> = filtered.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["a.md", "notes/", "notes/b.md", "notes/deep/", "notes/deep/c.md"]
        );
        assert_eq!(filtered["notes/"], "");
        assert_eq!(filtered["a.md"], fingerprint(b"alpha"));

        let full = builder().build_local(vault, false).await.unwrap();
        assert!(full.contains_key("scratch.tmp"));
        assert!(full.contains_key(".obsidian/"));
        assert!(full.contains_key(".obsidian/app.json"));
    }

    #[tokio::test]
    async fn test_local_snapshot_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let vault = Arc::new(FsVault::new(dir.path()).unwrap());
        for i in 0..40 {
            vault
                .write(&format!("n{}/f{}.md", i % 4, i), format!("{}", i).as_bytes())
                .await
                .unwrap();
        }

        let first = builder().build_local(vault.clone(), true).await.unwrap();
        let second = builder().build_local(vault, true).await.unwrap();
        assert_eq!(first.len(), 44);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_remote_snapshot_strips_root() {
        let remote = MemoryRemote::new();
        remote.insert("vault/a.md", b"alpha");
        remote.insert("vault/notes/b.md", b"beta");
        remote.insert("vault/junk.tmp", b"junk");
        remote.insert("other/c.md", b"outside");
        remote.create_dir("vault/notes/").await.unwrap();

        let list = builder().build_remote(&remote, "vault/").await.unwrap();
        let keys: Vec<&str> = list.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["a.md", "notes/", "notes/b.md"]);
        assert_eq!(list["notes/b.md"], fingerprint(b"beta"));
        assert_eq!(list["notes/"], "");
    }

    #[tokio::test]
    async fn test_remote_root_created_when_missing() {
        let remote = MemoryRemote::new();
        let list = builder().build_remote(&remote, "/fresh").await.unwrap();
        assert!(list.is_empty());
        assert!(remote.has_dir("fresh/"));
    }
}
