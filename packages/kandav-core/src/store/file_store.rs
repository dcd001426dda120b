/// Board file store.
///
/// Tracks each board file's on-disk state with:
/// - SHA-256 board IDs derived from the file path
/// - atomic writes (write to .tmp, fsync, rename)
/// - self-write suppression for the file watcher
/// - one async mutex per path so mutations on the same file serialize while
///   different files proceed concurrently
///
/// A `BoardState` is immutable once installed; every reload or merge builds
/// a fresh one and swaps it in as a unit.
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use super::{BoardOptions, StoreError};
use crate::bookmarks::mapper::columns_to_tree;
use crate::bookmarks::merge::merge_trees;
use crate::bookmarks::xbel;
use crate::calendar::derive::derive_items;
use crate::calendar::CalendarItem;
use crate::parser;
use crate::types::KanbanBoard;
use crate::watcher::echo::EchoGuard;

/// State for a single tracked board. Replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct BoardState {
    pub file_path: PathBuf,
    pub board_id: String,
    /// Display name: config override, board title, or file stem.
    pub derived_name: String,
    pub board: KanbanBoard,
    /// ETag over the markdown file content; changes with any board edit.
    pub content_etag: String,
    /// Cached XBEL projection of the column tree.
    pub bookmark_xml: String,
    /// ETag over the cached projection body.
    pub bookmark_etag: String,
    /// Resource filename the bookmark projection is served under.
    pub resource_name: String,
    pub bookmarks_enabled: bool,
    pub calendar_items: Option<Vec<CalendarItem>>,
    pub calendar_slug: Option<String>,
    pub calendar_name: Option<String>,
    pub last_modified: SystemTime,
    pub options: BoardOptions,
}

/// Tracks board files and serializes all mutations per path.
pub struct BoardFileStore {
    /// canonical path -> current state
    boards: RwLock<HashMap<PathBuf, Arc<BoardState>>>,
    /// Per-path mutation slot. Async so a waiting PUT does not block the
    /// runtime; one slot per path, lazily created, never removed.
    write_slots: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
    echo: Mutex<EchoGuard>,
}

impl Default for BoardFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardFileStore {
    pub fn new() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            write_slots: Mutex::new(HashMap::new()),
            echo: Mutex::new(EchoGuard::new()),
        }
    }

    /// Deterministic board ID from the file path: SHA-256 first 12 hex chars.
    pub fn board_id_from_path(file_path: &Path) -> String {
        let mut hasher = Sha256::new();
        hasher.update(file_path.to_string_lossy().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..6])
    }

    fn canonical(path: &Path) -> PathBuf {
        fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }

    fn content_etag(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.replace("\r\n", "\n").as_bytes());
        format!("\"{}\"", hex::encode(&hasher.finalize()[..16]))
    }

    /// Begin tracking a board file. Missing files get a minimal skeleton
    /// written first; the initial state loads synchronously.
    pub fn register(&self, path: &Path, options: BoardOptions) -> Result<PathBuf, StoreError> {
        if !path.exists() {
            log::info!("[kandav.store] Creating skeleton board at {:?}", path);
            Self::atomic_write(path, &parser::skeleton_board()).map_err(|e| StoreError::Write {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        let path = Self::canonical(path);

        let content = fs::read_to_string(&path)?;
        let board = parser::parse_markdown(&content);
        if !board.valid {
            return Err(StoreError::Parse(path.display().to_string()));
        }

        let state = Self::build_state(&path, options, board, &content)?;
        self.boards
            .write()
            .unwrap()
            .insert(path.clone(), Arc::new(state));
        Ok(path)
    }

    /// Stop tracking a board file. The file itself is left alone.
    pub fn unregister(&self, path: &Path) {
        let path = Self::canonical(path);
        self.boards.write().unwrap().remove(&path);
    }

    /// Reload a board from disk (after a watcher event). An invalid parse
    /// keeps the previous state untouched; a missing file is recreated as a
    /// skeleton before parsing.
    pub fn reload(&self, path: &Path) -> Result<(), StoreError> {
        let path = Self::canonical(path);
        let prev = self
            .get(&path)
            .ok_or_else(|| StoreError::NotFound(path.display().to_string()))?;

        if !path.exists() {
            log::info!("[kandav.store] Recreating missing board file {:?}", path);
            Self::atomic_write(&path, &parser::skeleton_board()).map_err(|e| {
                StoreError::Write {
                    path: path.display().to_string(),
                    source: e,
                }
            })?;
        }

        let content = fs::read_to_string(&path)?;
        let board = parser::parse_markdown(&content);
        if !board.valid {
            log::warn!(
                "[kandav.store] Invalid board content in {:?}, keeping previous state",
                path
            );
            return Ok(());
        }

        let state = Self::build_state(&path, prev.options.clone(), board, &content)?;
        self.boards
            .write()
            .unwrap()
            .insert(path.clone(), Arc::new(state));
        Ok(())
    }

    /// The sole write path: merge an incoming bookmark document into the
    /// board file and persist atomically.
    ///
    /// The per-path slot serializes overlapping calls; the file is re-read
    /// from disk under the slot (not from the cache) so an edit that raced
    /// in between is merged, not overwritten. Any failure aborts the whole
    /// operation with the in-memory state unchanged.
    pub async fn apply_incoming_bookmarks(
        &self,
        path: &Path,
        incoming_xml: &str,
    ) -> Result<(), StoreError> {
        let path = Self::canonical(path);
        let slot = self.write_slot(&path);
        let _guard = slot.lock().await;

        let prev = self
            .get(&path)
            .ok_or_else(|| StoreError::NotFound(path.display().to_string()))?;

        let disk_content = fs::read_to_string(&path)?;
        let board = parser::parse_markdown(&disk_content);
        if !board.valid {
            return Err(StoreError::Parse(path.display().to_string()));
        }

        let incoming = xbel::parse_xbel(incoming_xml).map_err(|e| StoreError::Parse(e.to_string()))?;
        let merged_columns = merge_trees(&incoming, &board.columns);
        let new_board = KanbanBoard {
            columns: merged_columns,
            ..board
        };
        let markdown = parser::generate_markdown(&new_board);

        self.echo.lock().unwrap().begin_mutation(&path);
        match Self::atomic_write(&path, &markdown) {
            Ok(()) => self.echo.lock().unwrap().mark_written(&path),
            Err(e) => {
                self.echo.lock().unwrap().abort_mutation(&path);
                return Err(StoreError::Write {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        }

        let state = Self::build_state(&path, prev.options.clone(), new_board, &markdown)?;
        self.boards
            .write()
            .unwrap()
            .insert(path.clone(), Arc::new(state));
        Ok(())
    }

    /// Check whether a watcher event for `path` is the echo of our own
    /// write. Consuming is one-shot per write.
    pub fn check_self_write(&self, path: &Path) -> bool {
        let path = Self::canonical(path);
        self.echo.lock().unwrap().consume_echo(&path)
    }

    pub fn get(&self, path: &Path) -> Option<Arc<BoardState>> {
        self.boards.read().unwrap().get(path).cloned()
    }

    /// All tracked boards, ordered by file path for stable listings.
    pub fn all(&self) -> Vec<Arc<BoardState>> {
        let mut states: Vec<Arc<BoardState>> =
            self.boards.read().unwrap().values().cloned().collect();
        states.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        states
    }

    /// Boards belonging to one calendar group, in stable order.
    pub fn by_calendar_slug(&self, slug: &str) -> Vec<Arc<BoardState>> {
        self.all()
            .into_iter()
            .filter(|s| s.calendar_slug.as_deref() == Some(slug))
            .collect()
    }

    /// All boards with calendar sync enabled.
    pub fn calendar_boards(&self) -> Vec<Arc<BoardState>> {
        self.all()
            .into_iter()
            .filter(|s| s.calendar_slug.is_some())
            .collect()
    }

    /// Distinct calendar slugs across tracked boards, in stable order.
    pub fn calendar_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = Vec::new();
        for state in self.calendar_boards() {
            if let Some(slug) = &state.calendar_slug {
                if !slugs.contains(slug) {
                    slugs.push(slug.clone());
                }
            }
        }
        slugs
    }

    /// Find a bookmark-enabled board by its resource filename.
    pub fn find_by_resource(&self, resource_name: &str) -> Option<Arc<BoardState>> {
        self.all()
            .into_iter()
            .find(|s| s.bookmarks_enabled && s.resource_name == resource_name)
    }

    fn write_slot(&self, path: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut slots = self.write_slots.lock().unwrap();
        slots
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Assemble a fresh state with all derived caches.
    fn build_state(
        path: &Path,
        options: BoardOptions,
        board: KanbanBoard,
        content: &str,
    ) -> Result<BoardState, StoreError> {
        let board_id = Self::board_id_from_path(path);
        let file_stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "board".to_string());

        let derived_name = options
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .or_else(|| Some(board.title.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| file_stem.clone());

        let resource_name = options
            .bookmark_file
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("{}.xbel", file_stem));

        let bookmark_xml = xbel::generate_xbel(&columns_to_tree(&board.columns));
        let bookmark_etag = Self::content_etag(&bookmark_xml);

        let (calendar_items, calendar_slug, calendar_name) = match &options.calendar {
            Some(cal) => {
                let slug = if cal.slug.is_empty() {
                    slugify(&derived_name)
                } else {
                    cal.slug.clone()
                };
                let name = cal.name.clone().unwrap_or_else(|| derived_name.clone());
                (
                    Some(derive_items(&board, &board_id)),
                    Some(slug),
                    Some(name),
                )
            }
            None => (None, None, None),
        };

        let last_modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or_else(|_| SystemTime::now());

        Ok(BoardState {
            file_path: path.to_path_buf(),
            board_id,
            derived_name,
            board,
            content_etag: Self::content_etag(content),
            bookmark_xml,
            bookmark_etag,
            resource_name,
            bookmarks_enabled: options.bookmarks,
            calendar_items,
            calendar_slug,
            calendar_name,
            last_modified,
            options,
        })
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync the
    /// directory. Refuses to replace a non-empty file with empty content.
    fn atomic_write(path: &Path, content: &str) -> Result<(), std::io::Error> {
        if content.trim().is_empty() {
            if let Ok(existing) = fs::read_to_string(path) {
                if !existing.trim().is_empty() {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "Refusing to overwrite non-empty file with empty content",
                    ));
                }
            }
        }

        let tmp_path = path.with_extension("kandav-sync.tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;

        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir) {
                let _ = d.sync_all();
            }
        }
        Ok(())
    }
}

/// Lowercase, alphanumeric-and-dash slug for calendar collection names.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "board".to_string()
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CalendarOptions;
    use std::io::Write as _;
    use tempfile::TempDir;

    const TEST_BOARD: &str = "\
---
kanban-plugin: board
---

## Todo
- [ ] [Example](https://example.com \"e1\")
- [ ] Walk the dog

## Done
- [x] Laundry @2026-03-02
";

    fn write_board(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        write!(f, "{}", content).unwrap();
        path
    }

    fn bookmark_options() -> BoardOptions {
        BoardOptions {
            bookmarks: true,
            ..BoardOptions::default()
        }
    }

    #[test]
    fn test_register_builds_caches() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        let key = store.register(&path, bookmark_options()).unwrap();

        let state = store.get(&key).unwrap();
        assert_eq!(state.derived_name, "work");
        assert_eq!(state.resource_name, "work.xbel");
        assert!(state.bookmark_xml.contains("https://example.com"));
        assert!(state.bookmark_etag.starts_with('"'));
        assert!(state.calendar_items.is_none());
    }

    #[test]
    fn test_register_missing_file_creates_skeleton() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.md");

        let store = BoardFileStore::new();
        let key = store.register(&path, bookmark_options()).unwrap();

        assert!(path.exists());
        let state = store.get(&key).unwrap();
        assert!(state.board.columns.is_empty());
    }

    #[test]
    fn test_register_invalid_board_fails() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "notes.md", "# just some notes\n");

        let store = BoardFileStore::new();
        assert!(matches!(
            store.register(&path, bookmark_options()),
            Err(StoreError::Parse(_))
        ));
    }

    #[test]
    fn test_reload_keeps_state_on_invalid_content() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        let key = store.register(&path, bookmark_options()).unwrap();
        let before = store.get(&key).unwrap();

        fs::write(&path, "no longer a board").unwrap();
        store.reload(&key).unwrap();

        let after = store.get(&key).unwrap();
        assert_eq!(after.bookmark_etag, before.bookmark_etag);
        assert_eq!(after.board.columns.len(), before.board.columns.len());
    }

    #[test]
    fn test_reload_recreates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        let key = store.register(&path, bookmark_options()).unwrap();

        fs::remove_file(&key).unwrap();
        store.reload(&key).unwrap();

        assert!(key.exists());
        let state = store.get(&key).unwrap();
        assert!(state.board.columns.is_empty());
    }

    #[tokio::test]
    async fn test_apply_incoming_merges_and_persists() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        let key = store.register(&path, bookmark_options()).unwrap();
        let before_etag = store.get(&key).unwrap().bookmark_etag.clone();

        let incoming = r#"<?xml version="1.0"?>
<xbel version="1.0">
  <folder><title>Todo</title>
    <bookmark href="https://example.com" id="e1"><title>Example</title></bookmark>
    <bookmark href="https://added.example"><title>Added</title></bookmark>
  </folder>
</xbel>"#;
        store.apply_incoming_bookmarks(&key, incoming).await.unwrap();

        let on_disk = fs::read_to_string(&key).unwrap();
        assert!(on_disk.contains("https://added.example"));
        // Local note survived the merge.
        assert!(on_disk.contains("Walk the dog"));
        // Column absent from the incoming tree is untouched.
        assert!(on_disk.contains("Laundry"));

        let state = store.get(&key).unwrap();
        assert_ne!(state.bookmark_etag, before_etag);
        // The write registered a pending self-echo, consumed exactly once.
        assert!(store.check_self_write(&key));
        assert!(!store.check_self_write(&key));
    }

    #[tokio::test]
    async fn test_apply_incoming_rejects_malformed_xml() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        let key = store.register(&path, bookmark_options()).unwrap();

        let result = store
            .apply_incoming_bookmarks(&key, "<xbel><folder>")
            .await;
        assert!(matches!(result, Err(StoreError::Parse(_))));

        // Nothing changed on disk or in memory.
        assert_eq!(fs::read_to_string(&key).unwrap(), TEST_BOARD);
        assert!(!store.check_self_write(&key));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_overlapping_writes_serialize() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = Arc::new(BoardFileStore::new());
        let key = store.register(&path, bookmark_options()).unwrap();

        let incoming_a = r#"<xbel version="1.0"><folder><title>FromA</title>
  <bookmark href="https://a.example"><title>A</title></bookmark></folder></xbel>"#;
        let incoming_b = r#"<xbel version="1.0"><folder><title>FromB</title>
  <bookmark href="https://b.example"><title>B</title></bookmark></folder></xbel>"#;

        let (s1, s2) = (store.clone(), store.clone());
        let (k1, k2) = (key.clone(), key.clone());
        let (r1, r2) = tokio::join!(
            tokio::spawn(async move { s1.apply_incoming_bookmarks(&k1, incoming_a).await }),
            tokio::spawn(async move { s2.apply_incoming_bookmarks(&k2, incoming_b).await }),
        );
        r1.unwrap().unwrap();
        r2.unwrap().unwrap();

        // Both edits landed, merged in call order.
        let on_disk = fs::read_to_string(&key).unwrap();
        assert!(on_disk.contains("https://a.example"));
        assert!(on_disk.contains("https://b.example"));
    }

    #[test]
    fn test_calendar_options_derive_items() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        let key = store
            .register(
                &path,
                BoardOptions {
                    bookmarks: true,
                    calendar: Some(CalendarOptions {
                        slug: "team".into(),
                        name: None,
                    }),
                    ..BoardOptions::default()
                },
            )
            .unwrap();

        let state = store.get(&key).unwrap();
        assert_eq!(state.calendar_slug.as_deref(), Some("team"));
        assert_eq!(state.calendar_items.as_ref().unwrap().len(), 1);
        assert_eq!(store.by_calendar_slug("team").len(), 1);
        assert_eq!(store.calendar_slugs(), vec!["team".to_string()]);
    }

    #[test]
    fn test_find_by_resource() {
        let dir = TempDir::new().unwrap();
        let path = write_board(&dir, "work.md", TEST_BOARD);

        let store = BoardFileStore::new();
        store.register(&path, bookmark_options()).unwrap();

        assert!(store.find_by_resource("work.xbel").is_some());
        assert!(store.find_by_resource("other.xbel").is_none());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Team Board 2026"), "team-board-2026");
        assert_eq!(slugify("  ??  "), "board");
    }

    #[test]
    fn test_board_id_deterministic() {
        let p = Path::new("/tmp/test.md");
        assert_eq!(
            BoardFileStore::board_id_from_path(p),
            BoardFileStore::board_id_from_path(p)
        );
        assert_eq!(BoardFileStore::board_id_from_path(p).len(), 12);
    }
}
