//! 搜索服务模块
//!
//! - searcher: 查找原语（Literal / Regex、单次查找回绕）
//! - engine: 单元搜索引擎（展示行提取、函数签名模式）
//! - walker: 文件遍历（排除目录剪枝、通配过滤）
//! - worker: 后台扫描线程与会合式批次交接
//! - coordinator: 扫描状态机与结果合并
//! - replace: 替换引擎
//! - session: 查找会话状态与历史

pub mod coordinator;
pub mod engine;
pub mod replace;
pub mod searcher;
pub mod session;
pub mod walker;
pub mod worker;

pub use coordinator::{
    ScanCoordinator, ScanError, ScanMode, ScanNotification, ScanRequest, ScanScope, ScanState,
};
pub use engine::{DocumentSearchEngine, QuerySpec, SearchUnit};
pub use replace::{
    infer_replace_target, replace_all_in_document, replace_all_in_text, replace_in_all_open,
    unescape_replacement, ReplaceTarget,
};
pub use searcher::{
    find_next, find_prev, preprocess_regex, wildcard_match, CompiledQuery, QueryOptions,
    UnitSearcher,
};
pub use session::{HistoryRing, SearchSessionState};
pub use walker::{parse_file_globs, FileFilter, FileWalker};
pub use worker::Batch;
