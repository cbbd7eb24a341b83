//! 搜索结果集
//!
//! - 记录序列 + 去重路径表（扫描期间只追加，不删除）
//! - 批次合并时对路径下标做平移（rebase）
//! - 扫描结束后按显示名排序
//! - 文档关闭/保存时的修正（fix-up），保证结果列表持续可用

use std::path::{Path, PathBuf};

use super::document::{DocId, DocumentStore};
use super::record::{MatchRecord, RecordOwner};

/// 文档关闭后对结果集做的修正
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseFixup {
    /// 没有记录受影响
    None,
    /// 未保存过的文档：记录被整体删除
    Removed(usize),
    /// 已有磁盘路径的文档：连续记录段改为引用路径表
    Rewritten { first: usize, count: usize },
}

pub struct ResultSet {
    records: Vec<MatchRecord>,
    path_table: Vec<PathBuf>,
    truncated: bool,
}

impl ResultSet {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            path_table: Vec::new(),
            truncated: false,
        }
    }

    pub fn clear(&mut self) {
        // 结果集可能很大，用 swap 确保内存真正释放
        let mut records = Vec::new();
        std::mem::swap(&mut self.records, &mut records);
        let mut paths = Vec::new();
        std::mem::swap(&mut self.path_table, &mut paths);
        self.truncated = false;
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn path_table(&self) -> &[PathBuf] {
        &self.path_table
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.path_table.get(index).map(PathBuf::as_path)
    }

    pub fn truncated(&self) -> bool {
        self.truncated
    }

    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    pub fn push(&mut self, record: MatchRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: Vec<MatchRecord>) {
        self.records.extend(records);
    }

    /// 合并一个批次。批内的路径下标从 0 开始，
    /// 先平移到共享路径表的当前长度，再一并追加。
    pub fn merge_batch(&mut self, mut records: Vec<MatchRecord>, paths: Vec<PathBuf>) {
        let base = self.path_table.len();
        for record in &mut records {
            record.rebase_path(base);
        }
        self.records.append(&mut records);
        self.path_table.extend(paths);
    }

    /// 记录所属文件/文档的显示名与父目录（排序用），
    /// 无路径的文档用会话内标题。
    fn sort_key(
        record: &MatchRecord,
        path_table: &[PathBuf],
        store: &DocumentStore,
    ) -> (String, String, usize) {
        let keyed_path = |p: &Path| {
            let name = p
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            let parent = p
                .parent()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            (name, parent)
        };

        let (name, parent) = match record.owner {
            RecordOwner::Path(i) => path_table
                .get(i)
                .map(|p| keyed_path(p))
                .unwrap_or_default(),
            RecordOwner::Doc(id) => match store.get(id) {
                Some(doc) => match &doc.path {
                    Some(p) => keyed_path(p),
                    None => (doc.title.to_lowercase(), String::new()),
                },
                None => Default::default(),
            },
        };
        (name, parent, record.line_number)
    }

    /// 最终展示顺序：显示名（不区分大小写）、父目录、行号
    pub fn sort(&mut self, store: &DocumentStore) {
        let path_table = &self.path_table;
        self.records
            .sort_by_cached_key(|r| Self::sort_key(r, path_table, store));
    }

    /// 文档关闭修正（规则见 CloseFixup）。
    ///
    /// 文档产生的记录总是一段连续区间（每个文档一轮产出），
    /// 所以找到第一条后遇到不匹配即可停止。
    pub fn on_document_closed(&mut self, id: DocId, last_path: Option<&Path>) -> CloseFixup {
        let Some(path) = last_path else {
            // 从未保存过的文档无法再从结果里打开，直接删除记录
            let before = self.records.len();
            self.records.retain(|r| r.doc_id() != Some(id));
            let removed = before - self.records.len();
            return if removed > 0 {
                CloseFixup::Removed(removed)
            } else {
                CloseFixup::None
            };
        };

        let mut first = None;
        let mut count = 0usize;
        let mut new_index = usize::MAX;
        for (i, record) in self.records.iter_mut().enumerate() {
            if record.doc_id() == Some(id) {
                if first.is_none() {
                    first = Some(i);
                    self.path_table.push(path.to_path_buf());
                    new_index = self.path_table.len() - 1;
                }
                record.owner = RecordOwner::Path(new_index);
                count += 1;
            } else if first.is_some() {
                break;
            }
        }

        match first {
            Some(first) => CloseFixup::Rewritten { first, count },
            None => CloseFixup::None,
        }
    }

    /// 文档保存后记录本身仍然有效，只需重绘对应的连续区间
    pub fn on_document_saved(&self, id: DocId) -> Option<(usize, usize)> {
        let mut first = None;
        let mut count = 0usize;
        for (i, record) in self.records.iter().enumerate() {
            if record.doc_id() == Some(id) {
                if first.is_none() {
                    first = Some(i);
                }
                count += 1;
            } else if first.is_some() {
                break;
            }
        }
        first.map(|f| (f, count))
    }
}

impl Default for ResultSet {
    fn default() -> Self {
        Self::new()
    }
}
