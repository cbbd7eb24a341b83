//! 文件遍历
//!
//! 基于 ignore crate 的深度优先遍历：
//! - 目录名命中排除列表时整棵子树不进入，兄弟目录不受影响
//! - 显式 include 通配列表优先，否则按扩展名排除
//! - 按文件名排序，同一快照下遍历顺序确定

use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

use crate::services::config::SearchSettings;

use super::searcher::wildcard_match;

#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// 文件名通配列表（如 `*.rs`）；非空时只收它命中的文件
    pub include_globs: Vec<String>,
    pub excluded_extensions: Vec<String>,
    pub excluded_folders: Vec<String>,
}

impl FileFilter {
    pub fn from_settings(settings: &SearchSettings, include_globs: Vec<String>) -> Self {
        Self {
            include_globs,
            excluded_extensions: settings.excluded_extensions.clone(),
            excluded_folders: settings.excluded_folders.clone(),
        }
    }

    pub fn matches_file(&self, path: &Path) -> bool {
        if !self.include_globs.is_empty() {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            self.include_globs.iter().any(|g| wildcard_match(g, name))
        } else {
            !self.is_excluded_extension(path)
        }
    }

    fn is_excluded_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.excluded_extensions
            .iter()
            .any(|e| ext.eq_ignore_ascii_case(e))
    }

    pub fn is_excluded_folder(&self, name: &str) -> bool {
        self.excluded_folders
            .iter()
            .any(|f| name.eq_ignore_ascii_case(f))
    }
}

/// 解析用户输入的文件通配列表："a.rs; *.toml" -> ["a.rs", "*.toml"]，
/// 丢弃空项与首尾空格
pub fn parse_file_globs(input: &str) -> Vec<String> {
    input
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

pub struct FileWalker {
    root: PathBuf,
    recurse: bool,
    excluded_folders: Vec<String>,
}

impl FileWalker {
    pub fn new(root: PathBuf, recurse: bool, filter: &FileFilter) -> Self {
        Self {
            root,
            recurse,
            excluded_folders: filter.excluded_folders.clone(),
        }
    }

    /// 产出根下的所有文件路径（不含目录）
    pub fn files(&self) -> impl Iterator<Item = PathBuf> {
        let excluded = self.excluded_folders.clone();
        let mut builder = WalkBuilder::new(&self.root);
        builder
            .standard_filters(false)
            .follow_links(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if !is_dir {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                !excluded.iter().any(|e| name.eq_ignore_ascii_case(e))
            });
        if !self.recurse {
            builder.max_depth(Some(1));
        }
        builder.build().filter_map(|entry| {
            let entry = entry.ok()?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                Some(entry.into_path())
            } else {
                None
            }
        })
    }
}
