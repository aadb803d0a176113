// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 重建编排器
//!
//! 在开发模式下，路由目录或服务端入口文件发生变化时重新构建应用处理器，
//! 并在新处理器完全构建好之后原子地替换当前处理器。
//!
//! 调度规则由纯状态机 [`RebuildSchedule`] 描述，不依赖任何运行时：
//! - 每个受关注的文件事件都会重置防抖计时器；
//! - 计时器触发时，空闲则立即开始重建，否则在队列中登记一次（容量为 1）；
//! - 同一时刻最多只有一个重建在执行。
//!
//! [`start`] 把状态机接到 tokio 上：事件通道、防抖计时器、进行中的构建任务
//! 与停机信号在同一个 `select!` 循环里处理，因此状态只在一个任务中被修改。

use std::fmt;
use std::future::{self, Future};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};

/// 默认防抖时长
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    Add,
    Unlink,
    Change,
}

impl fmt::Display for WatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            WatchKind::Add => write!(f, "add"),
            WatchKind::Unlink => write!(f, "unlink"),
            WatchKind::Change => write!(f, "change"),
        }
    }
}

/// 文件监视源产生的单个事件
#[derive(Debug, Clone, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchKind,
    pub path: PathBuf,
}

impl WatchEvent {
    pub fn new(kind: WatchKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// 决定哪些路径的变化需要触发重建：若干目录（递归）与若干单独文件。
///
/// 相对路径一律相对于 `root` 解释。
#[derive(Debug, Clone, Default)]
pub struct WatchScope {
    root: PathBuf,
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

impl WatchScope {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dirs: vec![],
            files: vec![],
        }
    }

    pub fn dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = self.absolute(dir.as_ref());
        self.dirs.push(dir);
        self
    }

    pub fn file(mut self, file: impl AsRef<Path>) -> Self {
        let file = self.absolute(file.as_ref());
        self.files.push(file);
        self
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        let path = self.absolute(path);
        self.dirs.iter().any(|dir| path.starts_with(dir))
            || self.files.iter().any(|file| path == *file)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// 状态机对驱动方的指示
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Wait,
    StartBuild,
}

/// 防抖与合并重建的纯状态机。
///
/// `debouncing` 与 `building` 可以同时成立：构建进行中又收到了新事件。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildSchedule {
    debouncing: bool,
    building: bool,
    queued: bool,
    stopped: bool,
}

impl RebuildSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 受关注的事件到达。返回 `true` 表示驱动方应当（重新）启动防抖计时器。
    pub fn on_watch_event(&mut self) -> bool {
        if self.stopped {
            return false;
        }
        self.debouncing = true;
        true
    }

    pub fn on_timer_fired(&mut self) -> Step {
        if self.stopped || !self.debouncing {
            return Step::Wait;
        }
        self.debouncing = false;
        if self.building {
            // 多次触发在这里合并为一次
            self.queued = true;
            Step::Wait
        } else {
            self.building = true;
            Step::StartBuild
        }
    }

    pub fn on_build_finished(&mut self) -> Step {
        self.building = false;
        if self.stopped || !self.queued {
            return Step::Wait;
        }
        self.queued = false;
        self.building = true;
        Step::StartBuild
    }

    /// 停机后不再接受事件，挂起的计时器与排队的重建全部取消
    pub fn stop(&mut self) {
        self.stopped = true;
        self.debouncing = false;
        self.queued = false;
    }

    /// 停机之后完成的构建结果只能丢弃
    pub fn accepts_results(&self) -> bool {
        !self.stopped
    }

    pub fn is_debouncing(&self) -> bool {
        self.debouncing
    }

    pub fn is_building(&self) -> bool {
        self.building
    }

    pub fn is_queued(&self) -> bool {
        self.queued
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// 当前处理器。单写者（编排器）多读者（每个请求）。
///
/// 读者拿到的是 `Arc` 快照，替换之后旧处理器继续为已经拿到它的请求服务。
pub struct HandlerSlot<H> {
    current: RwLock<Arc<H>>,
}

impl<H> HandlerSlot<H> {
    pub fn new(handler: H) -> Self {
        Self {
            current: RwLock::new(Arc::new(handler)),
        }
    }

    pub fn load(&self) -> Arc<H> {
        Arc::clone(&self.current.read())
    }

    /// 发布新处理器，返回被替换的旧处理器
    pub fn publish(&self, handler: Arc<H>) -> Arc<H> {
        std::mem::replace(&mut *self.current.write(), handler)
    }
}

/// 重建计数（不含 `start` 中的首次构建）
#[derive(Debug, Default)]
pub struct RebuildStats {
    started: AtomicU64,
    published: AtomicU64,
    failed: AtomicU64,
    discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildCounters {
    pub started: u64,
    pub published: u64,
    pub failed: u64,
    pub discarded: u64,
}

impl RebuildStats {
    pub fn snapshot(&self) -> RebuildCounters {
        RebuildCounters {
            started: self.started.load(Ordering::SeqCst),
            published: self.published.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Display for RebuildCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "started {}, published {}, failed {}, discarded {}",
            self.started, self.published, self.failed, self.discarded
        )
    }
}

/// `start` 返回的句柄
pub struct RebuildHandle<H> {
    slot: Arc<HandlerSlot<H>>,
    stats: Arc<RebuildStats>,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<H> RebuildHandle<H> {
    /// 最近一次发布的处理器，`start` 返回后永远不会为空
    pub fn current_handler(&self) -> Arc<H> {
        self.slot.load()
    }

    pub fn slot(&self) -> Arc<HandlerSlot<H>> {
        Arc::clone(&self.slot)
    }

    pub fn stats(&self) -> RebuildCounters {
        self.stats.snapshot()
    }

    /// 停止订阅文件事件并清除挂起的计时器。
    ///
    /// 进行中的构建会被等待完成，但其结果不会发布。重复调用无副作用。
    pub async fn stop(&self) {
        if let Some(stop_tx) = self.stop_tx.lock().take() {
            let _ = stop_tx.send(());
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("重建编排任务异常退出：{}", e);
            }
        }
    }
}

/// 执行首次构建并开始监听文件事件。
///
/// 首次构建失败时直接返回错误，调用方不应在没有处理器的情况下开始监听端口。
pub async fn start<H, E, F, Fut>(
    events: mpsc::Receiver<WatchEvent>,
    scope: WatchScope,
    builder: F,
    debounce: Duration,
) -> Result<RebuildHandle<H>, E>
where
    H: Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<H, E>> + Send + 'static,
{
    let started_at = Instant::now();
    let initial = builder().await.map_err(|e| {
        error!("首次构建失败：{}", e);
        e
    })?;
    info!("首次构建完成，用时{}ms", started_at.elapsed().as_millis());

    let slot = Arc::new(HandlerSlot::new(initial));
    let stats = Arc::new(RebuildStats::default());
    let (stop_tx, stop_rx) = oneshot::channel();

    let driver = Driver {
        scope,
        builder,
        debounce,
        slot: Arc::clone(&slot),
        stats: Arc::clone(&stats),
    };
    let task = tokio::spawn(driver.run(events, stop_rx));

    Ok(RebuildHandle {
        slot,
        stats,
        stop_tx: Mutex::new(Some(stop_tx)),
        task: Mutex::new(Some(task)),
    })
}

struct Driver<H, F> {
    scope: WatchScope,
    builder: F,
    debounce: Duration,
    slot: Arc<HandlerSlot<H>>,
    stats: Arc<RebuildStats>,
}

impl<H, E, F, Fut> Driver<H, F>
where
    H: Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = Result<H, E>> + Send + 'static,
{
    async fn run(
        self,
        mut events: mpsc::Receiver<WatchEvent>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut schedule = RebuildSchedule::new();
        let mut deadline: Option<Instant> = None;
        let mut in_flight: Option<JoinHandle<Result<H, E>>> = None;
        let mut build_started = Instant::now();
        let mut events_open = true;

        loop {
            tokio::select! {
                // 句柄被丢弃时 stop_rx 同样会完成
                _ = &mut stop_rx, if !schedule.is_stopped() => {
                    info!("重建编排器停止");
                    schedule.stop();
                    deadline = None;
                    if in_flight.is_none() {
                        break;
                    }
                }
                event = events.recv(), if events_open && !schedule.is_stopped() => match event {
                    Some(event) if self.scope.is_watched(&event.path) => {
                        debug!("文件事件：{} {}", event.kind, event.path.display());
                        if schedule.on_watch_event() {
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    Some(event) => {
                        debug!("忽略无关文件事件：{} {}", event.kind, event.path.display());
                    }
                    None => {
                        warn!("文件监视源已关闭，不再触发重建");
                        events_open = false;
                    }
                },
                _ = sleep_until_deadline(deadline) => {
                    deadline = None;
                    if schedule.on_timer_fired() == Step::StartBuild {
                        in_flight = Some(self.spawn_build());
                        build_started = Instant::now();
                    } else if schedule.is_queued() {
                        debug!("构建进行中，重建已排队");
                    }
                }
                result = join_in_flight(&mut in_flight) => {
                    in_flight = None;
                    self.finish_build(result, schedule.accepts_results(), build_started);
                    if schedule.on_build_finished() == Step::StartBuild {
                        in_flight = Some(self.spawn_build());
                        build_started = Instant::now();
                    }
                    if schedule.is_stopped() && in_flight.is_none() {
                        break;
                    }
                }
            }
        }
    }

    fn spawn_build(&self) -> JoinHandle<Result<H, E>> {
        self.stats.started.fetch_add(1, Ordering::SeqCst);
        info!("开始重建");
        tokio::spawn((self.builder)())
    }

    fn finish_build(
        &self,
        result: Result<Result<H, E>, JoinError>,
        accept: bool,
        build_started: Instant,
    ) {
        let elapsed = build_started.elapsed().as_millis();
        match result {
            Ok(Ok(handler)) if accept => {
                self.slot.publish(Arc::new(handler));
                self.stats.published.fetch_add(1, Ordering::SeqCst);
                info!("重建完成，用时{}ms，新处理器已发布", elapsed);
            }
            Ok(Ok(_)) => {
                self.stats.discarded.fetch_add(1, Ordering::SeqCst);
                warn!("重建在停机之后完成，结果已丢弃");
            }
            Ok(Err(e)) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!("重建失败，继续使用上一个处理器：{}", e);
            }
            Err(e) => {
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!("重建任务异常终止，继续使用上一个处理器：{}", e);
            }
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => future::pending().await,
    }
}

async fn join_in_flight<T>(task: &mut Option<JoinHandle<T>>) -> Result<T, JoinError> {
    match task {
        Some(task) => task.await,
        None => future::pending().await,
    }
}
