//! 扫描协调器
//!
//! 一次 search-all / replace-all 操作的编排：
//! - 活动文档 / 全部打开文档：在调用线程同步执行（内容已在内存里）
//! - 目录树：启动后台 worker，立即返回，批次经会合通道送回
//!
//! 状态机：Idle -> Scanning -> (Completed | Cancelled)，
//! 同一时刻最多一个扫描。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::{DocId, DocumentStore, RecordOwner, ResultSet};
use crate::services::config::{FunctionPatterns, SearchSettings};

use super::engine::{DocumentSearchEngine, QuerySpec, SearchUnit};
use super::replace;
use super::searcher::{CompiledQuery, QueryOptions};
use super::walker::FileFilter;
use super::worker::{run_scan_worker, Batch, WorkerParams};

static SCAN_ID: AtomicU64 = AtomicU64::new(0);

fn next_scan_id() -> u64 {
    SCAN_ID.fetch_add(1, Ordering::Relaxed)
}

/// 取消后等待 worker 退出的宽限期；超时后照常继续收尾
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// 搜索范围
#[derive(Debug, Clone)]
pub enum ScanScope {
    ActiveDocument(DocId),
    AllOpenDocuments,
    FilesystemTree {
        root: PathBuf,
        recurse: bool,
        include_globs: Vec<String>,
    },
}

/// 目录树扫描的结果形态。文档范围总是搜内容，该字段只对目录树生效。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// 在文件内容中找匹配
    FindInFiles,
    /// 文件路径本身就是结果，不读内容
    FindFiles,
}

#[derive(Debug, Clone)]
pub struct ScanRequest {
    pub scope: ScanScope,
    pub pattern: String,
    pub options: QueryOptions,
    pub mode: ScanMode,
    pub function_mode: bool,
}

/// 进入 Scanning 之前同步报告的错误
#[derive(Debug)]
pub enum ScanError {
    EmptyPattern,
    NoSearchFolder,
    FolderNotFound(PathBuf),
    InvalidPattern(String),
    ScanInProgress,
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::EmptyPattern => write!(f, "search pattern is empty"),
            ScanError::NoSearchFolder => write!(f, "no search folder given"),
            ScanError::FolderNotFound(p) => write!(f, "search folder not found: {}", p.display()),
            ScanError::InvalidPattern(e) => write!(f, "invalid pattern: {}", e),
            ScanError::ScanInProgress => write!(f, "a scan is already running"),
        }
    }
}

impl std::error::Error for ScanError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Completed,
    Cancelled,
}

/// 发给展示层的通知（发后不管）
#[derive(Debug, Clone)]
pub enum ScanNotification {
    Started {
        scan_id: u64,
    },
    BatchReady {
        scan_id: u64,
        count: usize,
        truncated: bool,
    },
    Completed {
        scan_id: u64,
        total: usize,
        truncated: bool,
    },
    Cancelled {
        scan_id: u64,
    },
    ReplaceCompleted {
        count: usize,
    },
}

pub struct ScanCoordinator {
    runtime: tokio::runtime::Handle,
    settings: SearchSettings,
    patterns: FunctionPatterns,
    state: ScanState,
    scan_id: u64,
    results: ResultSet,
    cancelled: Arc<AtomicBool>,
    workers_running: Arc<AtomicUsize>,
    batch_rx: Option<Receiver<Batch>>,
    notify_tx: Sender<ScanNotification>,
}

impl ScanCoordinator {
    pub fn new(
        runtime: tokio::runtime::Handle,
        settings: SearchSettings,
        patterns: FunctionPatterns,
        notify_tx: Sender<ScanNotification>,
    ) -> Self {
        Self {
            runtime,
            settings,
            patterns,
            state: ScanState::Idle,
            scan_id: 0,
            results: ResultSet::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            workers_running: Arc::new(AtomicUsize::new(0)),
            batch_rx: None,
            notify_tx,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn scan_id(&self) -> u64 {
        self.scan_id
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn results_mut(&mut self) -> &mut ResultSet {
        &mut self.results
    }

    /// 展示层关闭时调用，释放结果内存
    pub fn discard_results(&mut self) {
        self.results.clear();
    }

    fn notify(&self, notification: ScanNotification) {
        let _ = self.notify_tx.send(notification);
    }

    /// 启动一次扫描。配置性错误（空查询、目录不存在、坏正则）
    /// 在这里同步返回，状态不进入 Scanning。
    pub fn start_scan(
        &mut self,
        request: ScanRequest,
        store: &DocumentStore,
    ) -> Result<u64, ScanError> {
        if self.state == ScanState::Scanning {
            return Err(ScanError::ScanInProgress);
        }

        let is_filesystem = matches!(request.scope, ScanScope::FilesystemTree { .. });
        let find_files = is_filesystem && request.mode == ScanMode::FindFiles;
        if request.pattern.is_empty() && !request.function_mode && !find_files {
            return Err(ScanError::EmptyPattern);
        }
        if let ScanScope::FilesystemTree { root, .. } = &request.scope {
            if root.as_os_str().is_empty() {
                return Err(ScanError::NoSearchFolder);
            }
            if !root.exists() {
                return Err(ScanError::FolderNotFound(root.clone()));
            }
        }

        // 坏正则在进入 Scanning 前报告
        let compiled = if request.function_mode || find_files || request.pattern.is_empty() {
            None
        } else {
            Some(
                CompiledQuery::compile(&request.pattern, &request.options)
                    .map_err(|e| ScanError::InvalidPattern(e.to_string()))?,
            )
        };

        self.results.clear();
        self.scan_id = next_scan_id();
        self.cancelled = Arc::new(AtomicBool::new(false));
        self.notify(ScanNotification::Started {
            scan_id: self.scan_id,
        });

        let spec = QuerySpec {
            pattern: request.pattern,
            options: request.options,
            function_mode: request.function_mode,
        };

        match request.scope {
            ScanScope::ActiveDocument(id) => {
                self.scan_documents(std::slice::from_ref(&id), store, &spec, compiled.as_ref());
                Ok(self.scan_id)
            }
            ScanScope::AllOpenDocuments => {
                let ids: Vec<DocId> = store.open_ids().to_vec();
                self.scan_documents(&ids, store, &spec, compiled.as_ref());
                Ok(self.scan_id)
            }
            ScanScope::FilesystemTree {
                root,
                recurse,
                include_globs,
            } => {
                self.spawn_worker(root, recurse, include_globs, request.mode, spec, compiled);
                Ok(self.scan_id)
            }
        }
    }

    /// 同步范围：文档已在内存里，直接在调用线程扫完并排序
    fn scan_documents(
        &mut self,
        ids: &[DocId],
        store: &DocumentStore,
        spec: &QuerySpec,
        compiled: Option<&CompiledQuery>,
    ) {
        let mut engine = DocumentSearchEngine::new(self.patterns.clone());
        let mut budget = self.settings.max_results;
        let mut records = Vec::new();

        for &id in ids {
            let Some(doc) = store.get(id) else {
                continue;
            };
            let text = doc.text();
            let unit = SearchUnit {
                owner: RecordOwner::Doc(id),
                text: &text,
                language: doc.language.as_deref(),
            };
            engine.search(&unit, spec, compiled, &mut budget, &mut records);
            if budget == 0 {
                break;
            }
        }

        let truncated = budget == 0;
        self.results.extend(records);
        if truncated {
            self.results.mark_truncated();
        }
        self.results.sort(store);
        self.state = ScanState::Completed;
        tracing::info!(
            scan_id = self.scan_id,
            total = self.results.len(),
            truncated,
            "document scan completed"
        );
        self.notify(ScanNotification::Completed {
            scan_id: self.scan_id,
            total: self.results.len(),
            truncated,
        });
    }

    fn spawn_worker(
        &mut self,
        root: PathBuf,
        recurse: bool,
        include_globs: Vec<String>,
        mode: ScanMode,
        spec: QuerySpec,
        compiled: Option<CompiledQuery>,
    ) {
        let (tx, rx): (SyncSender<Batch>, Receiver<Batch>) = std::sync::mpsc::sync_channel(0);
        self.batch_rx = Some(rx);
        self.state = ScanState::Scanning;
        self.workers_running.fetch_add(1, Ordering::SeqCst);

        let params = WorkerParams {
            root,
            recurse,
            filter: FileFilter::from_settings(&self.settings, include_globs),
            mode,
            spec,
            compiled,
            batch_size: self.settings.batch_size,
            flush_interval: self.settings.flush_interval(),
            max_results: self.settings.max_results,
        };
        let engine = DocumentSearchEngine::new(self.patterns.clone());
        let cancelled = self.cancelled.clone();
        let running = self.workers_running.clone();
        tracing::info!(scan_id = self.scan_id, root = %params.root.display(), "filesystem scan started");

        self.runtime.spawn(async move {
            let _ = tokio::task::spawn_blocking(move || {
                run_scan_worker(params, engine, cancelled, running, tx)
            })
            .await;
        });
    }

    /// 取一个批次并合并进结果集；在会合点上阻塞直到 worker 交出
    /// 批次。只应在预期有异步结果的路径上调用，不能在事件循环里。
    /// 返回 true 表示这是最后一个批次（扫描已结束）。
    pub fn on_batch_ready(&mut self, store: &DocumentStore) -> bool {
        if self.state != ScanState::Scanning {
            return true;
        }
        let Some(rx) = self.batch_rx.as_ref() else {
            return true;
        };

        match rx.recv() {
            Ok(batch) => {
                let finished = batch.finished;
                if batch.truncated {
                    self.results.mark_truncated();
                }
                self.results.merge_batch(batch.records, batch.paths);
                self.notify(ScanNotification::BatchReady {
                    scan_id: self.scan_id,
                    count: self.results.len(),
                    truncated: self.results.truncated(),
                });
                if finished {
                    self.finish_scan(store);
                }
                finished
            }
            Err(_) => {
                // worker 异常消失，按已有数据收尾
                self.finish_scan(store);
                true
            }
        }
    }

    fn finish_scan(&mut self, store: &DocumentStore) {
        self.batch_rx = None;
        if self.cancelled.load(Ordering::Relaxed) {
            self.state = ScanState::Cancelled;
            self.notify(ScanNotification::Cancelled {
                scan_id: self.scan_id,
            });
            return;
        }
        // 一次性的最终排序；扫描过程中的中间顺序不需要和它一致
        self.results.sort(store);
        self.state = ScanState::Completed;
        tracing::info!(
            scan_id = self.scan_id,
            total = self.results.len(),
            truncated = self.results.truncated(),
            "filesystem scan completed"
        );
        self.notify(ScanNotification::Completed {
            scan_id: self.scan_id,
            total: self.results.len(),
            truncated: self.results.truncated(),
        });
    }

    /// 协作式取消：设置标志，排空通道让 worker 解除会合阻塞，
    /// 最多等一个宽限期；超时就不再等，worker 退出时只触碰自身状态。
    pub fn cancel(&mut self) {
        if self.state != ScanState::Scanning {
            return;
        }
        self.cancelled.store(true, Ordering::Relaxed);

        let deadline = Instant::now() + CANCEL_GRACE;
        if let Some(rx) = self.batch_rx.take() {
            loop {
                if Instant::now() >= deadline {
                    tracing::warn!(scan_id = self.scan_id, "scan worker did not stop in time");
                    break;
                }
                match rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(batch) => {
                        // 取消后到达的批次直接丢弃
                        if batch.finished {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if self.workers_running.load(Ordering::SeqCst) == 0 {
                            break;
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        }

        self.state = ScanState::Cancelled;
        self.notify(ScanNotification::Cancelled {
            scan_id: self.scan_id,
        });
    }

    /// 对所有打开的文档做整篇替换，只有发生替换的文档标脏
    pub fn replace_in_all_open(
        &self,
        store: &mut DocumentStore,
        pattern: &str,
        replacement: &str,
        options: &QueryOptions,
    ) -> Result<usize, ScanError> {
        if pattern.is_empty() {
            return Err(ScanError::EmptyPattern);
        }
        let query = CompiledQuery::compile(pattern, options)
            .map_err(|e| ScanError::InvalidPattern(e.to_string()))?;
        let count = replace::replace_in_all_open(store, &query, replacement);
        self.notify(ScanNotification::ReplaceCompleted { count });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn create_runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    fn coordinator(
        rt: &tokio::runtime::Runtime,
    ) -> (ScanCoordinator, mpsc::Receiver<ScanNotification>) {
        let (tx, rx) = mpsc::channel();
        let coordinator = ScanCoordinator::new(
            rt.handle().clone(),
            SearchSettings::default(),
            FunctionPatterns::default(),
            tx,
        );
        (coordinator, rx)
    }

    fn request_all_open(pattern: &str) -> ScanRequest {
        ScanRequest {
            scope: ScanScope::AllOpenDocuments,
            pattern: pattern.to_string(),
            options: QueryOptions {
                case_sensitive: true,
                ..Default::default()
            },
            mode: ScanMode::FindInFiles,
            function_mode: false,
        }
    }

    #[test]
    fn test_all_open_documents_scan_is_synchronous() {
        let rt = create_runtime();
        let (mut coordinator, rx) = coordinator(&rt);
        let mut store = DocumentStore::new();
        store.open_untitled("foo bar\nfoo");
        store.open_untitled("no match");
        store.open_untitled("foo");

        coordinator.start_scan(request_all_open("foo"), &store).unwrap();
        assert_eq!(coordinator.state(), ScanState::Completed);
        assert_eq!(coordinator.results().len(), 3);
        assert!(!coordinator.results().truncated());

        let mut saw_completed = false;
        while let Ok(n) = rx.try_recv() {
            if let ScanNotification::Completed { total, .. } = n {
                assert_eq!(total, 3);
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }

    #[test]
    fn test_active_document_scope() {
        let rt = create_runtime();
        let (mut coordinator, _rx) = coordinator(&rt);
        let mut store = DocumentStore::new();
        let a = store.open_untitled("foo foo");
        store.open_untitled("foo");

        let request = ScanRequest {
            scope: ScanScope::ActiveDocument(a),
            ..request_all_open("foo")
        };
        coordinator.start_scan(request, &store).unwrap();
        assert_eq!(coordinator.results().len(), 2);
        for r in coordinator.results().records() {
            assert_eq!(r.doc_id(), Some(a));
        }
    }

    #[test]
    fn test_empty_pattern_rejected_before_scanning() {
        let rt = create_runtime();
        let (mut coordinator, rx) = coordinator(&rt);
        let store = DocumentStore::new();

        let err = coordinator.start_scan(request_all_open(""), &store);
        assert!(matches!(err, Err(ScanError::EmptyPattern)));
        assert_eq!(coordinator.state(), ScanState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_invalid_regex_rejected_before_scanning() {
        let rt = create_runtime();
        let (mut coordinator, _rx) = coordinator(&rt);
        let store = DocumentStore::new();

        let mut request = request_all_open(r"a(b");
        request.options.use_regex = true;
        let err = coordinator.start_scan(request, &store);
        assert!(matches!(err, Err(ScanError::InvalidPattern(_))));
        assert_eq!(coordinator.state(), ScanState::Idle);
    }

    #[test]
    fn test_missing_folder_fails_fast() {
        let rt = create_runtime();
        let (mut coordinator, _rx) = coordinator(&rt);
        let store = DocumentStore::new();

        let request = ScanRequest {
            scope: ScanScope::FilesystemTree {
                root: PathBuf::from("/definitely/not/here/zfind"),
                recurse: true,
                include_globs: Vec::new(),
            },
            ..request_all_open("foo")
        };
        let err = coordinator.start_scan(request, &store);
        assert!(matches!(err, Err(ScanError::FolderNotFound(_))));

        let request = ScanRequest {
            scope: ScanScope::FilesystemTree {
                root: PathBuf::new(),
                recurse: true,
                include_globs: Vec::new(),
            },
            ..request_all_open("foo")
        };
        let err = coordinator.start_scan(request, &store);
        assert!(matches!(err, Err(ScanError::NoSearchFolder)));
    }

    #[test]
    fn test_second_scan_rejected_while_scanning() {
        let rt = create_runtime();
        let (mut coordinator, _rx) = coordinator(&rt);
        let store = DocumentStore::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "foo").unwrap();

        let request = ScanRequest {
            scope: ScanScope::FilesystemTree {
                root: dir.path().to_path_buf(),
                recurse: true,
                include_globs: Vec::new(),
            },
            ..request_all_open("foo")
        };
        coordinator.start_scan(request.clone(), &store).unwrap();
        assert!(coordinator.is_scanning());
        assert!(matches!(
            coordinator.start_scan(request, &store),
            Err(ScanError::ScanInProgress)
        ));

        // 收尾
        while !coordinator.on_batch_ready(&store) {}
        assert_eq!(coordinator.state(), ScanState::Completed);
    }
}
