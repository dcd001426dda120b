/// Bookmark tree model and the bidirectional XBEL/kanban mapping.
pub mod mapper;
pub mod merge;
pub mod xbel;

use serde::{Deserialize, Serialize};

/// Title of the synthetic folder that collects bookmarks appearing directly
/// under the XBEL document root.
pub const UNSORTED_FOLDER: &str = "Unsorted";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkEntry {
    /// Stable identity, assigned once and round-tripped through both the
    /// markdown link title and the XBEL `id` attribute. Empty until the
    /// merge assigns one.
    pub id: String,
    pub title: String,
    pub href: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BookmarkFolder {
    pub id: String,
    pub title: String,
    pub bookmarks: Vec<BookmarkEntry>,
    pub children: Vec<BookmarkFolder>,
}

impl BookmarkFolder {
    pub fn named(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Total bookmark count across the whole subtree.
    pub fn bookmark_count(&self) -> usize {
        self.bookmarks.len()
            + self
                .children
                .iter()
                .map(BookmarkFolder::bookmark_count)
                .sum::<usize>()
    }
}
