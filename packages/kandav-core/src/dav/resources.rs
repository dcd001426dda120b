/// Bookmark resource contract.
///
/// The root collection enumerates one child per tracked board; resources
/// are projections of board files, not filesystem entries, so anything but
/// read and write-through-merge is rejected.
use std::sync::Arc;
use std::time::SystemTime;

use crate::store::{BoardFileStore, StoreError};

/// Live-property data for one bookmark resource.
#[derive(Debug, Clone)]
pub struct ResourceMeta {
    /// Resource filename under the bookmarks root.
    pub name: String,
    /// WebDAV displayname: the board title.
    pub display_name: String,
    pub etag: String,
    pub content_length: usize,
    pub last_modified: SystemTime,
}

/// A resource body together with its metadata.
#[derive(Debug, Clone)]
pub struct ResourceContent {
    pub meta: ResourceMeta,
    pub body: String,
}

/// Protocol-facing view over the board file store.
#[derive(Clone)]
pub struct BookmarkResources {
    store: Arc<BoardFileStore>,
}

impl BookmarkResources {
    pub fn new(store: Arc<BoardFileStore>) -> Self {
        Self { store }
    }

    /// Enumerate the root collection's children.
    pub fn list(&self) -> Vec<ResourceMeta> {
        self.store
            .all()
            .into_iter()
            .filter(|s| s.bookmarks_enabled)
            .map(|s| ResourceMeta {
                name: s.resource_name.clone(),
                display_name: s.derived_name.clone(),
                etag: s.bookmark_etag.clone(),
                content_length: s.bookmark_xml.len(),
                last_modified: s.last_modified,
            })
            .collect()
    }

    /// Read the cached projection body for one resource.
    pub fn read(&self, name: &str) -> Result<ResourceContent, StoreError> {
        let state = self
            .store
            .find_by_resource(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        Ok(ResourceContent {
            meta: ResourceMeta {
                name: state.resource_name.clone(),
                display_name: state.derived_name.clone(),
                etag: state.bookmark_etag.clone(),
                content_length: state.bookmark_xml.len(),
                last_modified: state.last_modified,
            },
            body: state.bookmark_xml.clone(),
        })
    }

    /// Write an incoming bookmark document through the merge pipeline.
    /// Success is only reported after the merge-and-write fully completed.
    pub async fn write(&self, name: &str, incoming_xml: &str) -> Result<ResourceMeta, StoreError> {
        let state = self
            .store
            .find_by_resource(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        let path = state.file_path.clone();
        self.store
            .apply_incoming_bookmarks(&path, incoming_xml)
            .await?;
        self.read(name).map(|c| c.meta)
    }

    /// Bookmark resources are projections; they cannot be deleted.
    pub fn remove(&self, name: &str) -> Result<(), StoreError> {
        if self.store.find_by_resource(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Err(StoreError::Forbidden(
            "bookmark resources cannot be deleted",
        ))
    }

    /// Bookmark resources cannot be copied or moved either.
    pub fn relocate(&self, name: &str) -> Result<(), StoreError> {
        if self.store.find_by_resource(name).is_none() {
            return Err(StoreError::NotFound(name.to_string()));
        }
        Err(StoreError::Forbidden(
            "bookmark resources cannot be copied or moved",
        ))
    }

    /// The board file path behind a resource name, if any.
    pub fn path_for(&self, name: &str) -> Option<std::path::PathBuf> {
        self.store.find_by_resource(name).map(|s| s.file_path.clone())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.store.find_by_resource(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BoardOptions;
    use std::fs;
    use tempfile::TempDir;

    const TEST_BOARD: &str = "\
---
kanban-plugin: board
---

## Todo
- [ ] [Example](https://example.com \"e1\")
";

    fn setup() -> (TempDir, BookmarkResources, Arc<BoardFileStore>) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("work.md");
        fs::write(&path, TEST_BOARD).unwrap();

        let store = Arc::new(BoardFileStore::new());
        store
            .register(
                &path,
                BoardOptions {
                    bookmarks: true,
                    ..BoardOptions::default()
                },
            )
            .unwrap();
        (dir, BookmarkResources::new(store.clone()), store)
    }

    #[test]
    fn test_list_and_read() {
        let (_dir, resources, _store) = setup();

        let listing = resources.list();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "work.xbel");
        assert_eq!(listing[0].display_name, "work");

        let content = resources.read("work.xbel").unwrap();
        assert_eq!(content.meta.etag, listing[0].etag);
        assert_eq!(content.body.len(), content.meta.content_length);
        assert!(content.body.contains("https://example.com"));
    }

    #[test]
    fn test_read_unknown_resource() {
        let (_dir, resources, _store) = setup();
        assert!(matches!(
            resources.read("missing.xbel"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_write_roundtrip_updates_etag() {
        let (_dir, resources, _store) = setup();
        let before = resources.read("work.xbel").unwrap().meta.etag;

        let incoming = r#"<xbel version="1.0"><folder><title>Todo</title>
  <bookmark href="https://example.com" id="e1"><title>Example</title></bookmark>
  <bookmark href="https://new.example"><title>New</title></bookmark>
</folder></xbel>"#;
        let meta = resources.write("work.xbel", incoming).await.unwrap();
        assert_ne!(meta.etag, before);
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let (_dir, resources, _store) = setup();
        assert!(resources.write("work.xbel", "<xbel><folder>").await.is_err());
        assert!(resources
            .write("missing.xbel", "<xbel version=\"1.0\"></xbel>")
            .await
            .is_err());
    }

    #[test]
    fn test_delete_and_move_rejected() {
        let (_dir, resources, _store) = setup();
        assert!(matches!(
            resources.remove("work.xbel"),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            resources.relocate("work.xbel"),
            Err(StoreError::Forbidden(_))
        ));
        assert!(matches!(
            resources.remove("missing.xbel"),
            Err(StoreError::NotFound(_))
        ));
    }
}
