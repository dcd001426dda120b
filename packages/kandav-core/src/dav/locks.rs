/// In-memory store for cooperative lock files.
///
/// Some bookmark clients create a small lock file next to the bookmark
/// resource to coordinate between their own instances. These are plain
/// resources from the client's perspective but have nothing to do with the
/// board files: they live for the process lifetime only and never touch
/// disk. The store is an injected collaborator so adapters and tests can
/// supply their own.
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::SystemTime;

use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct LockResource {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub etag: String,
    pub created: SystemTime,
}

/// Narrow key-value interface for lock resources.
pub trait LockStore: Send + Sync {
    fn get(&self, name: &str) -> Option<LockResource>;
    fn put(&self, name: &str, body: Vec<u8>, content_type: Option<String>);
    /// Returns true when a resource was actually removed.
    fn delete(&self, name: &str) -> bool;
    fn exists(&self, name: &str) -> bool;
    fn names(&self) -> Vec<String>;
}

/// Process-lifetime lock store; nothing survives a restart.
#[derive(Default)]
pub struct MemoryLockStore {
    entries: RwLock<HashMap<String, LockResource>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockStore for MemoryLockStore {
    fn get(&self, name: &str) -> Option<LockResource> {
        self.entries.read().unwrap().get(name).cloned()
    }

    fn put(&self, name: &str, body: Vec<u8>, content_type: Option<String>) {
        let mut hasher = Sha256::new();
        hasher.update(&body);
        let etag = format!("\"{}\"", hex::encode(&hasher.finalize()[..8]));
        self.entries.write().unwrap().insert(
            name.to_string(),
            LockResource {
                body,
                content_type,
                etag,
                created: SystemTime::now(),
            },
        );
    }

    fn delete(&self, name: &str) -> bool {
        self.entries.write().unwrap().remove(name).is_some()
    }

    fn exists(&self, name: &str) -> bool {
        self.entries.read().unwrap().contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_delete() {
        let store = MemoryLockStore::new();
        assert!(!store.exists("bookmarks.xbel.lock"));

        store.put(
            "bookmarks.xbel.lock",
            b"locked by client-1".to_vec(),
            Some("application/octet-stream".into()),
        );
        assert!(store.exists("bookmarks.xbel.lock"));

        let lock = store.get("bookmarks.xbel.lock").unwrap();
        assert_eq!(lock.body, b"locked by client-1");
        assert!(lock.etag.starts_with('"'));

        assert!(store.delete("bookmarks.xbel.lock"));
        assert!(!store.delete("bookmarks.xbel.lock"));
        assert!(store.get("bookmarks.xbel.lock").is_none());
    }

    #[test]
    fn test_overwrite_changes_etag() {
        let store = MemoryLockStore::new();
        store.put("l", b"one".to_vec(), None);
        let first = store.get("l").unwrap().etag;
        store.put("l", b"two".to_vec(), None);
        assert_ne!(store.get("l").unwrap().etag, first);
    }

    #[test]
    fn test_names_sorted() {
        let store = MemoryLockStore::new();
        store.put("b", Vec::new(), None);
        store.put("a", Vec::new(), None);
        assert_eq!(store.names(), vec!["a".to_string(), "b".to_string()]);
    }
}
