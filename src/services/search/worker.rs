//! 后台扫描线程
//!
//! 单生产者单消费者的会合式交接：worker 填满本地批次后在 send 上
//! 阻塞，直到协调器取走。批次边界只落在文件之间，单个文件的结果
//! 不会被拆到两个批次里。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::document::{is_likely_binary, language_for_path};
use crate::models::{MatchRecord, RecordOwner};

use super::coordinator::ScanMode;
use super::engine::{DocumentSearchEngine, QuerySpec, SearchUnit};
use super::searcher::CompiledQuery;
use super::walker::{FileFilter, FileWalker};

/// 一次交接的单位：记录 + 本批新发现的路径。
/// 批内的路径下标从 0 开始，合并时由协调器平移。
#[derive(Debug, Default)]
pub struct Batch {
    pub records: Vec<MatchRecord>,
    pub paths: Vec<PathBuf>,
    pub finished: bool,
    pub truncated: bool,
}

pub(crate) struct WorkerParams {
    pub root: PathBuf,
    pub recurse: bool,
    pub filter: FileFilter,
    pub mode: ScanMode,
    pub spec: QuerySpec,
    pub compiled: Option<CompiledQuery>,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_results: usize,
}

struct RunningGuard(Arc<AtomicUsize>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 扫描线程入口。所有参数校验都在进入前完成。
pub(crate) fn run_scan_worker(
    params: WorkerParams,
    mut engine: DocumentSearchEngine,
    cancelled: Arc<AtomicBool>,
    running: Arc<AtomicUsize>,
    tx: SyncSender<Batch>,
) {
    let _running = RunningGuard(running);

    let mut pending = Batch::default();
    let mut last_flush = Instant::now();
    let mut budget = params.max_results;

    let walker = FileWalker::new(params.root.clone(), params.recurse, &params.filter);
    for path in walker.files() {
        // 每个文件开始前检查取消
        if cancelled.load(Ordering::Relaxed) {
            break;
        }
        if budget == 0 {
            break;
        }
        if !params.filter.matches_file(&path) {
            continue;
        }

        match params.mode {
            ScanMode::FindFiles => {
                // 只找文件时路径本身就是结果，不读内容
                pending.records.push(MatchRecord {
                    owner: RecordOwner::Path(pending.paths.len()),
                    match_start: 0,
                    match_end: 0,
                    line_number: 0,
                    line_text: String::new(),
                    in_line_start: 0,
                    in_line_end: 0,
                });
                pending.paths.push(path);
                budget -= 1;
            }
            ScanMode::FindInFiles => {
                // 临时加载，搜完即丢，不进入文档集合
                let content = match std::fs::read(&path) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                        continue;
                    }
                };
                if is_likely_binary(&content) {
                    continue;
                }
                let Ok(text) = std::str::from_utf8(&content) else {
                    continue;
                };
                let unit = SearchUnit {
                    owner: RecordOwner::Path(pending.paths.len()),
                    text,
                    language: language_for_path(&path),
                };
                let before = pending.records.len();
                engine.search(
                    &unit,
                    &params.spec,
                    params.compiled.as_ref(),
                    &mut budget,
                    &mut pending.records,
                );
                if pending.records.len() > before {
                    pending.paths.push(path);
                }
            }
        }

        let flush_due = pending.records.len() >= params.batch_size
            || (last_flush.elapsed() >= params.flush_interval
                && (!pending.records.is_empty() || !pending.paths.is_empty()));
        if flush_due {
            if tx.send(std::mem::take(&mut pending)).is_err() {
                // 协调器已经不在了
                return;
            }
            last_flush = Instant::now();
        }
    }

    // 最后一次交接（可能为空），让等待中的协调器解除阻塞
    pending.finished = true;
    pending.truncated = budget == 0;
    let _ = tx.send(pending);
}
