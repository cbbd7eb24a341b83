//! 文档模型
//!
//! 职责：
//! - 文本存储（Rope）与文件路径、语言的关联
//! - 打开文档集合的管理（插入顺序保持稳定）
//! - 临时加载磁盘文件（扫描用，不进入文档集合）

use ropey::Rope;
use slotmap::{new_key_type, SlotMap};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

new_key_type! { pub struct DocId; }

/// 文档操作错误
#[derive(Debug)]
pub enum DocError {
    Io(io::Error),
    Binary(PathBuf),
    InvalidUtf8(PathBuf),
    InvalidDocId,
}

impl fmt::Display for DocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocError::Io(e) => write!(f, "IO error: {}", e),
            DocError::Binary(p) => write!(f, "Binary file: {}", p.display()),
            DocError::InvalidUtf8(p) => write!(f, "Not valid UTF-8: {}", p.display()),
            DocError::InvalidDocId => write!(f, "invalid document id"),
        }
    }
}

impl std::error::Error for DocError {}

impl From<io::Error> for DocError {
    fn from(e: io::Error) -> Self {
        DocError::Io(e)
    }
}

/// 检查内容是否可能是二进制文件：前 8KB 是否有 NUL 字节
pub fn is_likely_binary(content: &[u8]) -> bool {
    content.iter().take(8192).any(|&b| b == 0)
}

/// 根据扩展名推断语言，用于函数签名搜索的模式选择
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    let lang = match ext.to_ascii_lowercase().as_str() {
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hxx" => "cpp",
        "rs" => "rust",
        "py" => "python",
        "go" => "go",
        "js" | "jsx" | "mjs" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        _ => return None,
    };
    Some(lang)
}

#[derive(Clone)]
pub struct Document {
    pub buffer: Rope,
    pub path: Option<PathBuf>,
    pub language: Option<String>,
    pub title: String,
    pub dirty: bool,
}

impl Document {
    /// 从磁盘内容创建文档；二进制和非 UTF-8 内容被拒绝
    pub fn load(path: &Path) -> Result<Self, DocError> {
        let content = std::fs::read(path)?;
        if is_likely_binary(&content) {
            return Err(DocError::Binary(path.to_path_buf()));
        }
        let text = match std::str::from_utf8(&content) {
            Ok(t) => t,
            Err(_) => return Err(DocError::InvalidUtf8(path.to_path_buf())),
        };

        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Ok(Self {
            buffer: Rope::from_str(text),
            path: Some(path.to_path_buf()),
            language: language_for_path(path).map(str::to_string),
            title,
            dirty: false,
        })
    }

    pub fn from_text(text: &str, title: String) -> Self {
        Self {
            buffer: Rope::from_str(text),
            path: None,
            language: None,
            title,
            dirty: false,
        }
    }

    /// 显示名：有路径用文件名，否则用会话内标题
    pub fn display_name(&self) -> &str {
        self.path
            .as_deref()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
            .unwrap_or(&self.title)
    }

    pub fn text(&self) -> String {
        self.buffer.to_string()
    }

    pub fn len_bytes(&self) -> usize {
        self.buffer.len_bytes()
    }
}

/// 打开文档集合
///
/// 与扫描时临时加载的文件不同，这里的文档有稳定的 DocId，
/// 搜索结果通过 DocId 引用它们。
pub struct DocumentStore {
    docs: SlotMap<DocId, Document>,
    order: Vec<DocId>,
    untitled_seq: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            docs: SlotMap::with_key(),
            order: Vec::new(),
            untitled_seq: 0,
        }
    }

    pub fn open(&mut self, path: &Path) -> Result<DocId, DocError> {
        let doc = Document::load(path)?;
        let id = self.docs.insert(doc);
        self.order.push(id);
        Ok(id)
    }

    /// 打开一个未保存的新文档，标题在会话内稳定且唯一
    pub fn open_untitled(&mut self, text: &str) -> DocId {
        self.untitled_seq += 1;
        let title = format!("Untitled-{}", self.untitled_seq);
        let id = self.docs.insert(Document::from_text(text, title));
        self.order.push(id);
        id
    }

    pub fn close(&mut self, id: DocId) -> Option<Document> {
        self.order.retain(|&d| d != id);
        self.docs.remove(id)
    }

    pub fn get(&self, id: DocId) -> Option<&Document> {
        self.docs.get(id)
    }

    pub fn get_mut(&mut self, id: DocId) -> Option<&mut Document> {
        self.docs.get_mut(id)
    }

    /// 打开顺序的文档 id 列表
    pub fn open_ids(&self) -> &[DocId] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn display_name(&self, id: DocId) -> Option<&str> {
        self.docs.get(id).map(Document::display_name)
    }

    pub fn save_as(&mut self, id: DocId, path: &Path) -> Result<(), DocError> {
        let doc = self.docs.get_mut(id).ok_or(DocError::InvalidDocId)?;
        let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
        for chunk in doc.buffer.chunks() {
            io::Write::write_all(&mut file, chunk.as_bytes())?;
        }
        io::Write::flush(&mut file)?;
        doc.path = Some(path.to_path_buf());
        doc.language = language_for_path(path).map(str::to_string);
        doc.title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        doc.dirty = false;
        Ok(())
    }
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_untitled_titles_unique() {
        let mut store = DocumentStore::new();
        let a = store.open_untitled("a");
        let b = store.open_untitled("b");
        assert_eq!(store.get(a).unwrap().title, "Untitled-1");
        assert_eq!(store.get(b).unwrap().title, "Untitled-2");
        assert_eq!(store.open_ids(), &[a, b]);
    }

    #[test]
    fn test_close_removes_from_order() {
        let mut store = DocumentStore::new();
        let a = store.open_untitled("a");
        let b = store.open_untitled("b");
        store.close(a);
        assert_eq!(store.open_ids(), &[b]);
        assert!(store.get(a).is_none());
    }

    #[test]
    fn test_load_rejects_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, b"abc\x00def").unwrap();
        assert!(matches!(Document::load(&path), Err(DocError::Binary(_))));
    }

    #[test]
    fn test_language_for_path() {
        assert_eq!(language_for_path(Path::new("a/b.rs")), Some("rust"));
        assert_eq!(language_for_path(Path::new("x.CPP")), Some("cpp"));
        assert_eq!(language_for_path(Path::new("noext")), None);
    }

    #[test]
    fn test_display_name_prefers_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, "hi").unwrap();
        let doc = Document::load(&path).unwrap();
        assert_eq!(doc.display_name(), "hello.txt");

        let doc = Document::from_text("x", "Untitled-1".to_string());
        assert_eq!(doc.display_name(), "Untitled-1");
    }
}
