//! 内存中的远程存储，测试用

use super::{DeleteStatus, RemoteEntry, RemoteStorage};
use crate::core::fingerprint::fingerprint;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
    /// 路径 -> 剩余的失败次数
    delete_failures: HashMap<String, u32>,
    put_failures: HashMap<String, u32>,
    /// 删除生效但返回失败的次数
    lost_deletes: HashMap<String, u32>,
    /// 剩余可成功的列表次数，None 表示不限
    list_budget: Option<u32>,
    puts: Vec<String>,
}

/// 以内容指纹作为列表属性的内存远程
#[derive(Default)]
pub struct MemoryRemote {
    inner: Mutex<Inner>,
    offline: AtomicBool,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: &str, data: &[u8]) {
        let mut inner = self.inner.lock().unwrap();
        inner.files.insert(path.to_string(), data.to_vec());
    }

    pub fn remove(&self, path: &str) {
        self.inner.lock().unwrap().files.remove(path);
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.lock().unwrap().files.get(path).cloned()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.inner.lock().unwrap().dirs.contains(path.trim_end_matches('/'))
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// 让接下来 `times` 次删除 `path` 失败
    pub fn fail_deletes(&self, path: &str, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .delete_failures
            .insert(path.to_string(), times);
    }

    pub fn fail_puts(&self, path: &str, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .put_failures
            .insert(path.to_string(), times);
    }

    /// 让接下来 `times` 次删除 `path` 生效后仍然返回失败
    pub fn lose_delete_responses(&self, path: &str, times: u32) {
        self.inner
            .lock()
            .unwrap()
            .lost_deletes
            .insert(path.to_string(), times);
    }

    /// 再成功 `times` 次列表后，之后的列表全部失败
    pub fn fail_lists_after(&self, times: u32) {
        self.inner.lock().unwrap().list_budget = Some(times);
    }

    pub fn allow_lists(&self) {
        self.inner.lock().unwrap().list_budget = None;
    }

    /// 按顺序记录的上传路径
    pub fn puts(&self) -> Vec<String> {
        self.inner.lock().unwrap().puts.clone()
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }

    fn take_failure(map: &mut HashMap<String, u32>, path: &str) -> bool {
        match map.get_mut(path) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn exists(&self, path: &str) -> Result<bool> {
        self.check_online()?;
        let inner = self.inner.lock().unwrap();
        let trimmed = path.trim_end_matches('/');
        Ok(trimmed.is_empty() || inner.files.contains_key(path) || inner.dirs.contains(trimmed))
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        self.check_online()?;
        let inner = self.inner.lock().unwrap();
        inner
            .files
            .get(path)
            .map(|data| Bytes::from(data.clone()))
            .ok_or_else(|| anyhow::anyhow!("404 Not Found: {}", path))
    }

    async fn put(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.check_online()?;
        let mut inner = self.inner.lock().unwrap();
        if Self::take_failure(&mut inner.put_failures, path) {
            anyhow::bail!("507 Insufficient Storage: {}", path);
        }
        inner.puts.push(path.to_string());
        inner.files.insert(path.to_string(), data);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<DeleteStatus> {
        self.check_online()?;
        let mut inner = self.inner.lock().unwrap();
        if Self::take_failure(&mut inner.delete_failures, path) {
            anyhow::bail!("423 Locked: {}", path);
        }
        if Self::take_failure(&mut inner.lost_deletes, path) {
            inner.files.remove(path);
            anyhow::bail!("504 Gateway Timeout: {}", path);
        }
        if path.ends_with('/') {
            let dir = path.trim_end_matches('/').to_string();
            let existed = inner.dirs.remove(&dir);
            inner.files.retain(|p, _| !p.starts_with(path));
            inner.dirs.retain(|d| !d.starts_with(path));
            return Ok(if existed {
                DeleteStatus::Deleted
            } else {
                DeleteStatus::NotFound
            });
        }
        Ok(match inner.files.remove(path) {
            Some(_) => DeleteStatus::Deleted,
            None => DeleteStatus::NotFound,
        })
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        self.check_online()?;
        let trimmed = path.trim_end_matches('/');
        if !trimmed.is_empty() {
            self.inner.lock().unwrap().dirs.insert(trimmed.to_string());
        }
        Ok(())
    }

    async fn list_recursive(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        self.check_online()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.list_budget.as_mut() {
            Some(0) => anyhow::bail!("500 Internal Server Error: {}", path),
            Some(left) => *left -= 1,
            None => {}
        }
        let prefix = path.trim_end_matches('/');
        let prefix = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };

        let mut entries = vec![RemoteEntry {
            path: prefix.clone(),
            is_dir: true,
            checksum: None,
        }];
        entries.extend(
            inner
                .dirs
                .iter()
                .filter(|d| d.starts_with(&prefix) && format!("{}/", d) != prefix)
                .map(|d| RemoteEntry {
                    path: format!("{}/", d),
                    is_dir: true,
                    checksum: None,
                }),
        );
        entries.extend(
            inner
                .files
                .iter()
                .filter(|(p, _)| p.starts_with(&prefix))
                .map(|(p, data)| RemoteEntry {
                    path: p.clone(),
                    is_dir: false,
                    checksum: Some(fingerprint(data)),
                }),
        );
        Ok(entries)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
