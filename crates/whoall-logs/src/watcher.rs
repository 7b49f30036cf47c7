use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::WatchError;

/// Coalescing "the log file changed" flag shared between the filesystem
/// observer and the ingestion loop.
///
/// Any number of `mark` calls before the next `take` collapse into one
/// pending signal.
#[derive(Clone, Debug, Default)]
pub struct DirtySignal {
    dirty: Arc<AtomicBool>,
}

impl DirtySignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that new data may be available
    pub fn mark(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Consume the pending signal, returning whether one was set
    pub fn take(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }

    pub fn is_marked(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }
}

/// Filesystem observer for one log file.
///
/// Watches the file's parent directory on the watcher backend's own thread and
/// marks the shared [`DirtySignal`] when the file is modified or created. The
/// OS watch is released when this is dropped.
pub struct ChangeNotifier {
    watcher: RecommendedWatcher,
    directory: PathBuf,
}

impl ChangeNotifier {
    /// Start observing `log_path`
    pub fn watch(log_path: &Path, signal: DirtySignal) -> Result<Self, WatchError> {
        let directory = log_path
            .parent()
            .map(|parent| {
                if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                }
            })
            .ok_or_else(|| WatchError::NoParent(log_path.to_path_buf()))?
            .to_path_buf();

        if !directory.is_dir() {
            return Err(WatchError::MissingDirectory(directory));
        }

        let watched_file = log_path.to_path_buf();
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<Event>| match result {
                Ok(event) => {
                    if is_relevant_notification(&event, &watched_file) {
                        signal.mark();
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "Log watcher error");
                }
            })
            .map_err(|source| WatchError::Notify {
                path: directory.clone(),
                source,
            })?;

        watcher
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Notify {
                path: directory.clone(),
                source,
            })?;

        tracing::info!(watch_directory = %directory.display(), "Watching log directory");

        Ok(Self { watcher, directory })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stop observing and release the OS watch
    pub fn stop(mut self) {
        if let Err(error) = self.watcher.unwatch(&self.directory) {
            tracing::debug!(%error, "Failed to unwatch log directory");
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("directory", &self.directory)
            .finish()
    }
}

fn is_relevant_notification(event: &Event, log_path: &Path) -> bool {
    let relevant_kind = matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_));
    if !relevant_kind {
        return false;
    }

    let Some(log_file_name) = log_path.file_name() else {
        return false;
    };

    event.paths.iter().any(|path| {
        path == log_path
            || path
                .file_name()
                .map(|file_name| file_name == log_file_name)
                .unwrap_or(false)
    })
}
