//! 服务层模块
//!
//! - config: 搜索配置（上限、批次、排除列表）
//! - search: 搜索/替换服务（引擎、协调器、后台 worker）

pub mod config;
pub mod search;

pub use config::{FunctionPatterns, SearchSettings};
