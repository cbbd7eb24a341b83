//! 查找会话状态
//!
//! 查找/替换界面存续期间的共享状态：最近一次的查询与选项、
//! 高亮串、各输入框的 MRU 历史。界面打开时创建，关闭时清空，
//! 不放在进程级全局里。

use super::searcher::QueryOptions;

/// MRU 历史环：最近使用的排最前，重复项上移不复制，超限裁掉最旧
#[derive(Debug, Clone)]
pub struct HistoryRing {
    items: Vec<String>,
    max: usize,
}

impl HistoryRing {
    pub fn new(max: usize) -> Self {
        Self {
            items: Vec::new(),
            max: max.max(1),
        }
    }

    pub fn push(&mut self, item: &str) {
        if item.is_empty() {
            return;
        }
        if let Some(pos) = self.items.iter().position(|i| i == item) {
            let existing = self.items.remove(pos);
            self.items.insert(0, existing);
        } else {
            self.items.insert(0, item.to_string());
            self.items.truncate(self.max);
        }
    }

    pub fn recent(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

pub struct SearchSessionState {
    pub last_pattern: String,
    pub last_options: QueryOptions,
    /// 编辑器里要高亮的串，随最近一次搜索更新
    pub highlight_pattern: String,
    pub search_history: HistoryRing,
    pub replace_history: HistoryRing,
    pub folder_history: HistoryRing,
    pub files_history: HistoryRing,
}

impl SearchSessionState {
    pub fn new(max_history: usize) -> Self {
        Self {
            last_pattern: String::new(),
            last_options: QueryOptions::default(),
            highlight_pattern: String::new(),
            search_history: HistoryRing::new(max_history),
            replace_history: HistoryRing::new(max_history),
            folder_history: HistoryRing::new(max_history),
            files_history: HistoryRing::new(max_history),
        }
    }

    pub fn note_search(&mut self, pattern: &str, options: QueryOptions) {
        self.last_pattern = pattern.to_string();
        self.last_options = options;
        self.highlight_pattern = pattern.to_string();
        self.search_history.push(pattern);
    }

    pub fn note_replace(&mut self, replacement: &str) {
        self.replace_history.push(replacement);
    }

    pub fn note_folder(&mut self, folder: &str) {
        self.folder_history.push(folder);
    }

    pub fn note_files(&mut self, files: &str) {
        self.files_history.push(files);
    }

    /// 界面关闭时调用
    pub fn clear(&mut self) {
        self.last_pattern.clear();
        self.highlight_pattern.clear();
        self.search_history.clear();
        self.replace_history.clear();
        self.folder_history.clear();
        self.files_history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_mru_order() {
        let mut ring = HistoryRing::new(3);
        ring.push("a");
        ring.push("b");
        ring.push("c");
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["c", "b", "a"]);

        // 重复项上移，不增长
        ring.push("a");
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec!["a", "c", "b"]);
        assert_eq!(ring.len(), 3);
    }

    #[test]
    fn test_history_caps_at_max() {
        let mut ring = HistoryRing::new(2);
        ring.push("a");
        ring.push("b");
        ring.push("c");
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.recent(), Some("c"));
    }

    #[test]
    fn test_history_ignores_empty() {
        let mut ring = HistoryRing::new(2);
        ring.push("");
        assert!(ring.is_empty());
    }

    #[test]
    fn test_session_note_and_clear() {
        let mut session = SearchSessionState::new(20);
        session.note_search(
            "foo",
            QueryOptions {
                case_sensitive: true,
                ..Default::default()
            },
        );
        session.note_replace("bar");
        assert_eq!(session.last_pattern, "foo");
        assert_eq!(session.highlight_pattern, "foo");
        assert_eq!(session.search_history.recent(), Some("foo"));

        session.clear();
        assert!(session.last_pattern.is_empty());
        assert!(session.search_history.is_empty());
        assert!(session.replace_history.is_empty());
    }
}
