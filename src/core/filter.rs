//! 排除规则
//!
//! 目录名、扩展名和子串标记三类规则，任何一条命中即排除。

use crate::config::{ExclusionSettings, Platform};
use std::collections::BTreeSet;

/// 编译后的排除规则
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    pub directories: BTreeSet<String>,
    /// 小写，带前导 `.`
    pub extensions: BTreeSet<String>,
    pub markers: BTreeSet<String>,
    /// 为 true 时不排除任何路径
    pub override_all: bool,
}

impl ExclusionRules {
    /// 从配置构建规则，并按平台追加隐式排除的配置目录
    pub fn from_settings(settings: &ExclusionSettings, platform: Platform) -> Self {
        let mut directories: BTreeSet<String> = settings
            .directories
            .iter()
            .map(|d| d.trim_matches('/').to_string())
            .filter(|d| !d.is_empty())
            .collect();

        let skip_hidden = match platform {
            Platform::Desktop => settings.skip_hidden_desktop,
            Platform::Mobile => settings.skip_hidden_mobile,
        };
        if skip_hidden && !settings.config_dir_name.is_empty() {
            directories.insert(settings.config_dir_name.clone());
        }

        Self {
            directories,
            extensions: settings
                .extensions
                .iter()
                .map(|e| normalize_extension(e))
                .filter(|e| e.len() > 1)
                .collect(),
            markers: settings
                .markers
                .iter()
                .filter(|m| !m.is_empty())
                .cloned()
                .collect(),
            override_all: settings.override_all,
        }
    }

    /// 路径是否被排除
    pub fn is_excluded(&self, path: &str) -> bool {
        is_excluded(path, self)
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}

/// 最后一段的扩展名（小写，带 `.`）。以 `.` 开头的名字没有扩展名
fn extension_of(segment: &str) -> Option<String> {
    match segment.rfind('.') {
        Some(pos) if pos > 0 => Some(segment[pos..].to_lowercase()),
        _ => None,
    }
}

pub fn is_excluded(path: &str, rules: &ExclusionRules) -> bool {
    if rules.override_all {
        return false;
    }

    let mut segments: Vec<&str> = path.split('/').collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }

    if segments
        .iter()
        .any(|segment| rules.directories.contains(*segment))
    {
        return true;
    }

    if let Some(ext) = segments.last().and_then(|last| extension_of(last)) {
        if rules.extensions.contains(&ext) {
            return true;
        }
    }

    rules.markers.iter().any(|marker| path.contains(marker.as_str()))
}
