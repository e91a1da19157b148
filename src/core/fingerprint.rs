//! 内容指纹

/// 目录在快照中的指纹
pub const DIRECTORY_FINGERPRINT: &str = "";

/// 计算文件内容的指纹（BLAKE3，取前 16 字节的十六进制）
pub fn fingerprint(data: &[u8]) -> String {
    let hash = blake3::hash(data);
    hash.to_hex()[..32].to_string()
}

/// 路径是否表示目录（以 `/` 结尾）
pub fn is_directory_path(path: &str) -> bool {
    path.ends_with('/')
}
