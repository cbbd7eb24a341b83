//! zfind - 编辑器多文件搜索替换引擎库
//!
//! 模块结构：
//! - models: 数据模型（Document, MatchRecord, ResultSet）
//! - services: 服务层（SearchSettings, 搜索/替换服务）

pub mod logging;
pub mod models;
pub mod services;
