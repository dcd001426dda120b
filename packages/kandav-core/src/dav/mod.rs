/// Protocol-facing resource semantics, independent of any HTTP library.
///
/// [`resources::BookmarkResources`] is the read/write/list contract the
/// WebDAV adapter drives; [`locks`] is the small in-memory store for the
/// cooperative lock files some bookmark clients create.
pub mod locks;
pub mod resources;
