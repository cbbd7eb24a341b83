//! 搜索结果记录
//!
//! 一条记录要么属于当前打开的文档（Doc），要么通过索引引用
//! ResultSet 路径表中的磁盘文件（Path）。

use super::document::DocId;

/// 记录的归属
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOwner {
    /// 打开的活动文档
    Doc(DocId),
    /// ResultSet 路径表的下标
    Path(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub owner: RecordOwner,
    /// 匹配在完整文本中的字节区间
    pub match_start: usize,
    pub match_end: usize,
    /// 匹配起点所在行（从 0 开始）
    pub line_number: usize,
    /// 归一化后的所在行文本（用于展示）
    pub line_text: String,
    /// 匹配在 line_text 中的字节区间（归一化后重新校准）
    pub in_line_start: usize,
    pub in_line_end: usize,
}

impl MatchRecord {
    pub fn doc_id(&self) -> Option<DocId> {
        match self.owner {
            RecordOwner::Doc(id) => Some(id),
            RecordOwner::Path(_) => None,
        }
    }

    pub fn path_index(&self) -> Option<usize> {
        match self.owner {
            RecordOwner::Doc(_) => None,
            RecordOwner::Path(i) => Some(i),
        }
    }

    /// 批次合并时把批内路径下标平移到共享路径表
    pub(crate) fn rebase_path(&mut self, base: usize) {
        if let RecordOwner::Path(i) = self.owner {
            self.owner = RecordOwner::Path(i + base);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebase_path_only_touches_path_owner() {
        let mut r = MatchRecord {
            owner: RecordOwner::Path(2),
            match_start: 0,
            match_end: 3,
            line_number: 0,
            line_text: "foo".to_string(),
            in_line_start: 0,
            in_line_end: 3,
        };
        r.rebase_path(5);
        assert_eq!(r.owner, RecordOwner::Path(7));

        let mut store = crate::models::DocumentStore::new();
        let id = store.open_untitled("x");
        let mut r = MatchRecord {
            owner: RecordOwner::Doc(id),
            match_start: 0,
            match_end: 1,
            line_number: 0,
            line_text: "x".to_string(),
            in_line_start: 0,
            in_line_end: 1,
        };
        r.rebase_path(5);
        assert_eq!(r.owner, RecordOwner::Doc(id));
    }
}
