//! Single active filesystem watch on the current save directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::event::{AccessKind, AccessMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};

use super::error::WatchError;

/// A live watch on one directory.
///
/// Closing the binding (or dropping it) guarantees its handler is not
/// invoked for events delivered afterwards.
pub struct WatchBinding {
    id: u64,
    directory: PathBuf,
    open: Arc<AtomicBool>,
    _watcher: notify::RecommendedWatcher,
}

impl WatchBinding {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Stop delivering events and release the OS watch.
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for WatchBinding {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for WatchBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchBinding")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Owns the one [`WatchBinding`] allowed at a time.
#[derive(Debug, Default)]
pub struct DirectoryWatchController {
    active: Option<WatchBinding>,
    next_id: u64,
}

impl DirectoryWatchController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Watch `directory`, calling `on_change` for every change in it.
    ///
    /// Read-only access events are skipped because reading a file is not a
    /// change; every other kind counts, whatever file it concerns.
    ///
    /// Any previous watch is closed first, even when attaching fails, so
    /// on error the controller is left without a live watch.
    pub fn attach<F>(&mut self, directory: &Path, on_change: F) -> Result<&WatchBinding, WatchError>
    where
        F: Fn() + Send + 'static,
    {
        self.detach();

        let open = Arc::new(AtomicBool::new(true));
        let flag = open.clone();
        let event_dir = directory.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if !flag.load(Ordering::Acquire) {
                return;
            }
            match res {
                // Reads (our own scans included) don't change the directory.
                Ok(event) if is_read_access(&event.kind) => {}
                Ok(event) => {
                    crate::debug_event!("watcher", "event", "{:?} {:?}", event.kind, event.paths);
                    on_change();
                }
                Err(e) => {
                    tracing::error!("[watcher] file watch error in {}: {e}", event_dir.display());
                }
            }
        })?;

        watcher
            .watch(directory, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: directory.to_path_buf(),
                reason: e.to_string(),
            })?;

        self.next_id += 1;
        crate::log_event!("watcher", "watching", "{}", directory.display());

        Ok(self.active.insert(WatchBinding {
            id: self.next_id,
            directory: directory.to_path_buf(),
            open,
            _watcher: watcher,
        }))
    }

    /// Close the active watch, returning the directory it was bound to.
    pub fn detach(&mut self) -> Option<PathBuf> {
        let binding = self.active.take()?;
        let directory = binding.directory.clone();
        binding.close();
        crate::debug_event!("watcher", "closed", "{}", directory.display());
        Some(directory)
    }

    pub fn active(&self) -> Option<&WatchBinding> {
        self.active.as_ref()
    }

    pub fn is_watching(&self) -> bool {
        self.active.is_some()
    }
}

fn is_read_access(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Access(access) if *access != AccessKind::Close(AccessMode::Write))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, ModifyKind};
    use tempfile::TempDir;

    #[test]
    fn test_read_access_is_ignored() {
        assert!(is_read_access(&EventKind::Access(AccessKind::Read)));
        assert!(is_read_access(&EventKind::Access(AccessKind::Open(
            AccessMode::Any
        ))));
        assert!(!is_read_access(&EventKind::Access(AccessKind::Close(
            AccessMode::Write
        ))));
        assert!(!is_read_access(&EventKind::Create(CreateKind::File)));
        assert!(!is_read_access(&EventKind::Modify(ModifyKind::Any)));
    }

    #[test]
    fn test_attach_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let mut controller = DirectoryWatchController::new();

        let err = controller
            .attach(&dir.path().join("missing"), || {})
            .unwrap_err();

        assert!(matches!(err, WatchError::PathWatchFailed { .. }));
        assert!(!controller.is_watching());
    }

    #[test]
    fn test_failed_attach_closes_previous_watch() {
        let dir = TempDir::new().unwrap();
        let mut controller = DirectoryWatchController::new();

        controller.attach(dir.path(), || {}).unwrap();
        assert!(controller.is_watching());

        assert!(controller.attach(&dir.path().join("missing"), || {}).is_err());
        assert!(!controller.is_watching());
    }

    #[test]
    fn test_detach_returns_directory() {
        let dir = TempDir::new().unwrap();
        let mut controller = DirectoryWatchController::new();

        let id = controller.attach(dir.path(), || {}).unwrap().id();
        assert_eq!(id, 1);
        assert_eq!(controller.detach(), Some(dir.path().to_path_buf()));
        assert_eq!(controller.detach(), None);
    }
}
