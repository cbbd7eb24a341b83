//! 数据模型模块
//!
//! - Document / DocumentStore: 打开的文档集合
//! - MatchRecord: 单条搜索结果
//! - ResultSet: 搜索结果集（含路径表）

pub mod document;
pub mod record;
pub mod result_set;

pub use document::{DocError, DocId, Document, DocumentStore};
pub use record::{MatchRecord, RecordOwner};
pub use result_set::{CloseFixup, ResultSet};
