pub mod file_store;

pub use file_store::{BoardFileStore, BoardState};

/// Per-board tracking options, taken from the configuration document.
#[derive(Debug, Clone, Default)]
pub struct BoardOptions {
    /// Display name override; falls back to the board title, then the
    /// file stem.
    pub name: Option<String>,
    /// Whether the board is exposed as a bookmark resource.
    pub bookmarks: bool,
    /// Bookmark resource filename override ("<stem>.xbel" by default).
    pub bookmark_file: Option<String>,
    pub calendar: Option<CalendarOptions>,
}

#[derive(Debug, Clone, Default)]
pub struct CalendarOptions {
    /// Collection slug; boards sharing a slug form one calendar group.
    pub slug: String,
    pub name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Board not found: {0}")]
    NotFound(String),

    #[error("Invalid board content: {0}")]
    Parse(String),

    #[error("Write failed for {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation not allowed: {0}")]
    Forbidden(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
