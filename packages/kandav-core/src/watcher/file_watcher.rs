/// File watcher using notify-debouncer-full.
///
/// Watches board files and the configuration document, emits [`WatchEvent`]
/// via a broadcast channel. 500ms debounce window for macOS FSEvents and
/// cloud sync stability.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_full::{new_debouncer, DebouncedEvent, Debouncer, RecommendedCache};
use tokio::sync::broadcast;

use super::types::WatchEvent;

const DEBOUNCE_DURATION: Duration = Duration::from_millis(500);

/// Path sets the watcher resolves raw events against.
#[derive(Debug, Default)]
struct PathMapping {
    board_files: HashSet<PathBuf>,
    config_file: Option<PathBuf>,
    /// Watched parent directories (to avoid duplicate watches).
    watched_dirs: HashSet<PathBuf>,
}

/// Watches board files and the config document for changes.
pub struct FileWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher, RecommendedCache>,
    mapping: Arc<RwLock<PathMapping>>,
    event_tx: broadcast::Sender<WatchEvent>,
}

impl FileWatcher {
    /// Create a new file watcher and a receiver for its events.
    pub fn new() -> Result<(Self, broadcast::Receiver<WatchEvent>), notify::Error> {
        let (event_tx, event_rx) = broadcast::channel(256);
        let mapping = Arc::new(RwLock::new(PathMapping::default()));

        let tx_clone = event_tx.clone();
        let mapping_clone = mapping.clone();

        let debouncer = new_debouncer(
            DEBOUNCE_DURATION,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify::Error>>| match result {
                Ok(events) => {
                    for event in events {
                        handle_debounced_event(&event, &mapping_clone, &tx_clone);
                    }
                }
                Err(errors) => {
                    for e in errors {
                        log::error!("[kandav.watcher] Watch error: {}", e);
                    }
                }
            },
        )?;

        Ok((
            Self {
                debouncer,
                mapping,
                event_tx,
            },
            event_rx,
        ))
    }

    /// Start watching a board file.
    pub fn watch_board(&mut self, path: &Path) -> Result<(), notify::Error> {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.mapping
            .write()
            .unwrap()
            .board_files
            .insert(canonical.clone());
        self.ensure_watched(&canonical)?;
        log::info!("[kandav.watcher] Watching board file {:?}", canonical);
        Ok(())
    }

    /// Stop watching a board file. The parent directory stays watched;
    /// events for untracked paths are simply dropped.
    pub fn unwatch_board(&mut self, path: &Path) {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.mapping.write().unwrap().board_files.remove(&canonical);
    }

    /// Start watching the configuration document.
    pub fn watch_config(&mut self, path: &Path) -> Result<(), notify::Error> {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        self.mapping.write().unwrap().config_file = Some(canonical.clone());
        self.ensure_watched(&canonical)?;
        log::info!("[kandav.watcher] Watching config {:?}", canonical);
        Ok(())
    }

    /// Get a clone of the broadcast sender.
    pub fn event_sender(&self) -> broadcast::Sender<WatchEvent> {
        self.event_tx.clone()
    }

    /// Ensure the parent directory of a file is being watched.
    fn ensure_watched(&mut self, file_path: &Path) -> Result<(), notify::Error> {
        if let Some(parent) = file_path.parent() {
            {
                let mut mapping = self.mapping.write().unwrap();
                if mapping.watched_dirs.contains(parent) {
                    return Ok(());
                }
                mapping.watched_dirs.insert(parent.to_path_buf());
            }
            self.debouncer.watch(parent, RecursiveMode::NonRecursive)?;
        }
        Ok(())
    }
}

fn handle_debounced_event(
    event: &DebouncedEvent,
    mapping: &Arc<RwLock<PathMapping>>,
    tx: &broadcast::Sender<WatchEvent>,
) {
    use notify::EventKind;

    for path in &event.paths {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());

        let mapping = mapping.read().unwrap();
        let is_config = mapping.config_file.as_deref() == Some(canonical.as_path());
        let is_board = mapping.board_files.contains(&canonical);
        drop(mapping);

        let watch_event = if is_config {
            WatchEvent::ConfigChanged
        } else if is_board {
            match event.kind {
                EventKind::Remove(_) => WatchEvent::BoardRemoved {
                    path: canonical.clone(),
                },
                EventKind::Create(_) => WatchEvent::BoardCreated {
                    path: canonical.clone(),
                },
                _ => WatchEvent::BoardChanged {
                    path: canonical.clone(),
                },
            }
        } else {
            continue;
        };

        if let Err(e) = tx.send(watch_event) {
            log::warn!("[kandav.watcher] No receivers: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_mapping_membership() {
        let mut mapping = PathMapping::default();
        let path = PathBuf::from("/tmp/board.md");
        mapping.board_files.insert(path.clone());

        assert!(mapping.board_files.contains(&path));
        assert!(!mapping.board_files.contains(Path::new("/tmp/other.md")));
    }
}
