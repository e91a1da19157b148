pub mod local;
#[cfg(test)]
pub mod memory;
pub mod propfind;
pub mod webdav;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

pub use local::FsVault;
pub use webdav::WebDavRemote;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 远程递归列表中的条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// 相对服务根的路径，无前导 `/`
    pub path: String,
    pub is_dir: bool,
    /// 服务端提供的内容指纹属性
    pub checksum: Option<String>,
}

/// 删除结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    /// 目标本来就不存在
    NotFound,
}

/// 远程存储接口
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// 检查路径是否存在（也用作连通性探测）
    async fn exists(&self, path: &str) -> Result<bool>;

    /// 读取整个文件
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// 写入整个文件，父目录不存在时创建
    async fn put(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// 删除文件或目录
    async fn delete(&self, path: &str) -> Result<DeleteStatus>;

    /// 创建目录
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 无限深度递归列出 `path` 下的所有条目（包含 `path` 自身）
    async fn list_recursive(&self, path: &str) -> Result<Vec<RemoteEntry>>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 目录的一层列表，路径均相对库根，目录以 `/` 结尾
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

/// 本地库接口
#[async_trait]
pub trait LocalVault: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// 写入整个文件，父目录不存在时创建
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// 列出一层目录，`""` 表示库根
    async fn list(&self, path: &str) -> Result<Listing>;

    async fn create_folder(&self, path: &str) -> Result<()>;

    /// 移入回收站而不是直接删除
    async fn trash(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    fn name(&self) -> &str;
}

/// 拼接远程库目录与库内相对路径
pub fn join_remote(base: &str, path: &str) -> String {
    let base = base.trim_matches('/');
    let path = path.trim_start_matches('/');
    if base.is_empty() {
        path.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}
