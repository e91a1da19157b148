use super::{propfind, DeleteStatus, RemoteEntry, RemoteStorage, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use crate::config::Settings;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use opendal::{layers::TimeoutLayer, Operator};
use reqwest::{Method, StatusCode};
use std::time::Duration;

/// WebDAV 远程存储
///
/// 读写删与建目录走 opendal，带自定义属性的无限深度 PROPFIND 由 reqwest 直接发出。
pub struct WebDavRemote {
    operator: Operator,
    client: reqwest::Client,
    endpoint: reqwest::Url,
    username: String,
    password: String,
    checksum_namespace: String,
    checksum_property: String,
    name: String,
}

impl WebDavRemote {
    pub fn new(settings: &Settings) -> Result<Self> {
        use opendal::services::Webdav;

        let endpoint_str = settings.endpoint.trim_end_matches('/');
        let endpoint = reqwest::Url::parse(&format!("{}/", endpoint_str))
            .with_context(|| format!("无效的 WebDAV 地址: {}", settings.endpoint))?;

        let builder = Webdav::default()
            .endpoint(endpoint_str)
            .username(&settings.username)
            .password(&settings.password);

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(IO_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            operator,
            client,
            name: format!("webdav://{}", endpoint_str),
            endpoint,
            username: settings.username.clone(),
            password: settings.password.clone(),
            checksum_namespace: settings.checksum_namespace.clone(),
            checksum_property: settings.checksum_property.clone(),
        })
    }

    fn url_for(&self, path: &str) -> Result<reqwest::Url> {
        let encoded: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        Ok(self.endpoint.join(&encoded.join("/"))?)
    }

    fn normalize(path: &str) -> String {
        path.replace('\\', "/").trim_start_matches('/').to_string()
    }
}

#[async_trait]
impl RemoteStorage for WebDavRemote {
    async fn exists(&self, path: &str) -> Result<bool> {
        match self.operator.stat(&Self::normalize(path)).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let data = self.operator.read(&Self::normalize(path)).await?;
        Ok(data.to_bytes())
    }

    async fn put(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let path = Self::normalize(path);

        // 确保父目录存在（递归创建）
        if let Some((parent, _)) = path.rsplit_once('/') {
            let mut current_path = String::new();
            for part in parent.split('/').filter(|s| !s.is_empty()) {
                current_path.push_str(part);
                current_path.push('/');
                // 忽略创建目录的错误（可能已存在）
                let _ = self.operator.create_dir(&current_path).await;
            }
        }

        self.operator.write(&path, data).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<DeleteStatus> {
        let path = Self::normalize(path);
        if !self.exists(&path).await? {
            return Ok(DeleteStatus::NotFound);
        }
        match self.operator.delete(&path).await {
            Ok(_) => Ok(DeleteStatus::Deleted),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(DeleteStatus::NotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_dir(&self, path: &str) -> Result<()> {
        let path = Self::normalize(path);
        let dir_path = if path.ends_with('/') {
            path
        } else {
            format!("{}/", path)
        };
        self.operator.create_dir(&dir_path).await?;
        Ok(())
    }

    async fn list_recursive(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let url = self.url_for(path)?;
        let method = Method::from_bytes(b"PROPFIND")?;

        let response = self
            .client
            .request(method, url.clone())
            .basic_auth(&self.username, Some(&self.password))
            .header("Depth", "infinity")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(propfind::request_body(
                &self.checksum_namespace,
                &self.checksum_property,
            ))
            .send()
            .await
            .with_context(|| format!("PROPFIND 请求失败: {}", url))?;

        let status = response.status();
        if status != StatusCode::MULTI_STATUS && status != StatusCode::OK {
            anyhow::bail!("PROPFIND {} 返回 {}", url, status);
        }

        let body = response.text().await?;
        let entries =
            propfind::parse_multistatus(&body, self.endpoint.path(), &self.checksum_property)?;
        tracing::debug!("PROPFIND {} 返回 {} 个条目", url, entries.len());
        Ok(entries)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
