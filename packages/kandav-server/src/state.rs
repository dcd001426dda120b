use std::sync::Arc;

use kandav_core::dav::locks::LockStore;
use kandav_core::dav::resources::BookmarkResources;
use kandav_core::store::BoardFileStore;

/// Shared handler state. The store is constructed once at the composition
/// root and passed by reference; the lock store is injected so tests can
/// substitute their own.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<BoardFileStore>,
    pub resources: BookmarkResources,
    pub locks: Arc<dyn LockStore>,
}

impl AppState {
    pub fn new(store: Arc<BoardFileStore>, locks: Arc<dyn LockStore>) -> Self {
        Self {
            resources: BookmarkResources::new(store.clone()),
            store,
            locks,
        }
    }
}
