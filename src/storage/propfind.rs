//! PROPFIND 多状态响应解析

use super::RemoteEntry;
use anyhow::{Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;

/// 请求体：资源类型 + 指纹属性
pub fn request_body(namespace: &str, property: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:x="{}">
  <d:prop>
    <d:resourcetype/>
    <x:{}/>
  </d:prop>
</d:propfind>"#,
        namespace, property
    )
}

#[derive(Default)]
struct PendingResponse {
    href: String,
    is_dir: bool,
    checksum: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Capture {
    None,
    Href,
    Checksum,
}

/// 解析 207 响应体。`base_path` 是服务地址的路径部分，会从 href 中剥离
pub fn parse_multistatus(xml: &str, base_path: &str, property: &str) -> Result<Vec<RemoteEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PendingResponse> = None;
    let mut capture = Capture::None;

    loop {
        match reader.read_event().context("PROPFIND 响应不是合法的 XML")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => current = Some(PendingResponse::default()),
                b"href" => capture = Capture::Href,
                b"collection" => {
                    if let Some(r) = current.as_mut() {
                        r.is_dir = true;
                    }
                }
                name if name == property.as_bytes() => capture = Capture::Checksum,
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(r) = current.as_mut() {
                        r.is_dir = true;
                    }
                }
            }
            Event::Text(t) => {
                if let Some(r) = current.as_mut() {
                    let text = t.unescape()?.into_owned();
                    match capture {
                        Capture::Href => r.href.push_str(&text),
                        Capture::Checksum if !text.is_empty() => {
                            r.checksum.get_or_insert_with(String::new).push_str(&text)
                        }
                        _ => {}
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(r) = current.take() {
                        if let Some(entry) = into_entry(r, base_path)? {
                            entries.push(entry);
                        }
                    }
                }
                b"href" => capture = Capture::None,
                name if name == property.as_bytes() => capture = Capture::None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}

fn into_entry(response: PendingResponse, base_path: &str) -> Result<Option<RemoteEntry>> {
    let href = response.href.trim();
    if href.is_empty() {
        return Ok(None);
    }

    // href 可能是完整 URL，也可能只是路径
    let href_path = match reqwest::Url::parse(href) {
        Ok(url) => url.path().to_string(),
        Err(_) => href.to_string(),
    };
    let decoded = urlencoding::decode(&href_path)
        .with_context(|| format!("href 解码失败: {}", href))?;

    let base = base_path.trim_end_matches('/');
    let relative = decoded
        .strip_prefix(base)
        .unwrap_or(&decoded)
        .trim_start_matches('/');

    let mut path = relative.trim_end_matches('/').to_string();
    if response.is_dir && !path.is_empty() {
        path.push('/');
    }

    Ok(Some(RemoteEntry {
        path,
        is_dir: response.is_dir,
        checksum: response.checksum.map(|c| c.trim().to_string()),
    }))
}
