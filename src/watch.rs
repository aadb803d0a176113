//! 基于 `notify` 的文件监视源。
//!
//! 只监视 [`WatchScope`] 中列出的目录（递归）与单独文件所在的目录（非递归），
//! 把底层事件翻译为 [`WatchEvent`] 送入通道。范围过滤由编排器完成。

use std::path::{Path, PathBuf};

use log::{debug, warn};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::exception::Exception;
use crate::orchestrator::{WatchEvent, WatchKind, WatchScope};

/// 通道容量；监视回调在通道满时阻塞，不丢事件
const CHANNEL_CAPACITY: usize = 256;

/// 持有底层 watcher，丢弃即停止监视
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl FileWatcher {
    pub fn new(scope: &WatchScope) -> Result<(Self, mpsc::Receiver<WatchEvent>), Exception> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("文件监视出错：{}", e);
                    return;
                }
            };
            let Some(kind) = translate(&event.kind) else {
                return;
            };
            for path in event.paths {
                // 接收端关闭说明编排器已停止
                if tx.blocking_send(WatchEvent::new(kind, path)).is_err() {
                    return;
                }
            }
        })
        .map_err(|e| Exception::WatchFailed(e.to_string()))?;

        let mut watched = vec![];
        for dir in scope.dirs() {
            if watch_existing(&mut watcher, dir, RecursiveMode::Recursive)? {
                watched.push(dir.clone());
            }
        }
        for file in scope.files() {
            let Some(parent) = file.parent() else {
                continue;
            };
            if watched.iter().any(|w| parent.starts_with(w)) {
                continue;
            }
            if watch_existing(&mut watcher, parent, RecursiveMode::NonRecursive)? {
                watched.push(parent.to_path_buf());
            }
        }

        Ok((
            Self {
                _watcher: watcher,
                watched,
            },
            rx,
        ))
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

fn watch_existing(
    watcher: &mut RecommendedWatcher,
    path: &Path,
    mode: RecursiveMode,
) -> Result<bool, Exception> {
    if !path.is_dir() {
        warn!("监视目录不存在，已跳过：{}", path.display());
        return Ok(false);
    }
    watcher
        .watch(path, mode)
        .map_err(|e| Exception::WatchFailed(format!("{}: {}", path.display(), e)))?;
    debug!("开始监视：{}", path.display());
    Ok(true)
}

/// 重命名拆成旧路径的 unlink 与新路径的 add；访问类事件忽略
fn translate(kind: &EventKind) -> Option<WatchKind> {
    match kind {
        EventKind::Create(_) => Some(WatchKind::Add),
        EventKind::Remove(_) => Some(WatchKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(WatchKind::Unlink),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(WatchKind::Add),
        EventKind::Modify(_) => Some(WatchKind::Change),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind};

    #[test]
    fn test_translate_event_kinds() {
        assert_eq!(translate(&EventKind::Create(CreateKind::File)), Some(WatchKind::Add));
        assert_eq!(translate(&EventKind::Remove(RemoveKind::Any)), Some(WatchKind::Unlink));
        assert_eq!(
            translate(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(WatchKind::Change)
        );
        assert_eq!(
            translate(&EventKind::Modify(ModifyKind::Name(RenameMode::From))),
            Some(WatchKind::Unlink)
        );
        assert_eq!(
            translate(&EventKind::Modify(ModifyKind::Name(RenameMode::To))),
            Some(WatchKind::Add)
        );
        assert_eq!(translate(&EventKind::Access(AccessKind::Any)), None);
    }

    #[test]
    fn test_missing_dirs_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("app/pages")).unwrap();
        std::fs::create_dir_all(dir.path().join("server")).unwrap();
        let scope = WatchScope::new(dir.path())
            .dir("app/pages")
            .dir("server/routes/api")
            .file("server/index.ts");

        let (watcher, _rx) = FileWatcher::new(&scope).unwrap();
        assert_eq!(
            watcher.watched(),
            &[dir.path().join("app/pages"), dir.path().join("server")]
        );
    }
}
