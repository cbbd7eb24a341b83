//! 搜索配置服务
//!
//! 扫描开始时读取的外部配置：结果上限、批次阈值、刷新间隔、
//! 排除扩展名/目录等，支持 JSON 文件覆盖默认值。

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const SETTINGS_DIR: &str = ".zfind";
const SETTINGS_FILE: &str = "settings.json";

fn default_max_results() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    1_000
}

fn default_flush_interval_ms() -> u64 {
    3_000
}

fn default_max_history() -> usize {
    20
}

fn default_excluded_extensions() -> Vec<String> {
    ["exe", "dll", "obj", "o", "a", "so", "bin", "pdb"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_excluded_folders() -> Vec<String> {
    [".git", ".svn", ".hg", "node_modules", "target"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSettings {
    /// 结果上限，达到后扫描提前结束并标记 truncated
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    /// 批次大小阈值，后台线程攒满即交接
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 距上次交接超过该时长且有数据时也交接
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    #[serde(default = "default_excluded_extensions")]
    pub excluded_extensions: Vec<String>,
    #[serde(default = "default_excluded_folders")]
    pub excluded_folders: Vec<String>,
    /// 搜索/替换历史条数上限
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            excluded_extensions: default_excluded_extensions(),
            excluded_folders: default_excluded_folders(),
            max_history: default_max_history(),
        }
    }
}

impl SearchSettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

pub fn get_settings_path() -> Option<PathBuf> {
    get_cache_dir().map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
}

pub fn ensure_settings_file() -> std::io::Result<PathBuf> {
    let path = get_settings_path().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Cannot determine settings directory",
        )
    })?;
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    if !path.exists() {
        let content = serde_json::to_string_pretty(&SearchSettings::default())
            .unwrap_or_else(|_| "{}".to_string());
        std::fs::write(&path, content)?;
    }
    Ok(path)
}

pub fn load_settings() -> Option<SearchSettings> {
    let path = get_settings_path()?;
    let data = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&data).ok()
}

pub fn ensure_log_dir() -> std::io::Result<PathBuf> {
    let dir = get_cache_dir()
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "Cannot determine cache directory")
        })?
        .join(SETTINGS_DIR)
        .join("logs");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn get_cache_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Caches"));
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
            return Some(PathBuf::from(xdg));
        }
        return std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".cache"));
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(local) = std::env::var("LOCALAPPDATA") {
            return Some(PathBuf::from(local));
        }
        return std::env::var("APPDATA").ok().map(PathBuf::from);
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}

/// 每种语言的函数定义正则，函数签名搜索用。
/// 模式只负责找出候选定义，具体函数名由引擎解析后再比对。
#[derive(Debug, Clone)]
pub struct FunctionPatterns {
    map: FxHashMap<String, String>,
}

impl FunctionPatterns {
    pub fn empty() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }

    pub fn get(&self, language: &str) -> Option<&str> {
        self.map.get(language).map(String::as_str)
    }

    pub fn set(&mut self, language: &str, pattern: &str) {
        self.map.insert(language.to_string(), pattern.to_string());
    }
}

impl Default for FunctionPatterns {
    fn default() -> Self {
        let mut map = FxHashMap::default();
        map.insert(
            "c".to_string(),
            r"[A-Za-z_][\w \t*&]*\([^;{}()]*\)[ \t\r\n]*\{".to_string(),
        );
        map.insert(
            "cpp".to_string(),
            r"[A-Za-z_~][\w:<>,~ \t*&]*\([^;{}()]*\)[ \t\w]*[\r\n]*\{".to_string(),
        );
        map.insert(
            "rust".to_string(),
            r"fn[ \t]+[A-Za-z_]\w*[^;{]*\{".to_string(),
        );
        map.insert(
            "python".to_string(),
            r"def[ \t]+[A-Za-z_]\w*[ \t]*\([^)]*\)[^:]*:".to_string(),
        );
        map.insert(
            "go".to_string(),
            r"func[ \t]+(\([^)]*\)[ \t]*)?[A-Za-z_]\w*[ \t]*\([^)]*\)[^{]*\{".to_string(),
        );
        map.insert(
            "javascript".to_string(),
            r"function[ \t]+[A-Za-z_$][\w$]*[ \t]*\([^)]*\)[ \t\r\n]*\{".to_string(),
        );
        map.insert(
            "typescript".to_string(),
            r"function[ \t]+[A-Za-z_$][\w$]*[ \t]*\([^)]*\)[^{]*\{".to_string(),
        );
        map.insert(
            "java".to_string(),
            r"[\w<>\[\]]+[ \t]+[A-Za-z_]\w*[ \t]*\([^)]*\)[ \t\w]*[\r\n]*\{".to_string(),
        );
        Self { map }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SearchSettings::default();
        assert_eq!(settings.max_results, 10_000);
        assert_eq!(settings.batch_size, 1_000);
        assert_eq!(settings.flush_interval(), Duration::from_secs(3));
        assert!(settings.excluded_folders.iter().any(|f| f == ".git"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: SearchSettings = serde_json::from_str(r#"{"max_results": 42}"#).unwrap();
        assert_eq!(settings.max_results, 42);
        assert_eq!(settings.batch_size, 1_000);
        assert!(!settings.excluded_extensions.is_empty());
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = SearchSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let back: SearchSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.max_results, settings.max_results);
        assert_eq!(back.excluded_folders, settings.excluded_folders);
    }

    #[test]
    fn test_function_patterns_known_languages() {
        let patterns = FunctionPatterns::default();
        assert!(patterns.get("c").is_some());
        assert!(patterns.get("rust").is_some());
        assert!(patterns.get("cobol").is_none());

        let mut patterns = FunctionPatterns::empty();
        assert!(patterns.get("c").is_none());
        patterns.set("c", r"x\(");
        assert_eq!(patterns.get("c"), Some(r"x\("));
    }
}
