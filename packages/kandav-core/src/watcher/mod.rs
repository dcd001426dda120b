/// Filesystem watching and self-write suppression.
pub mod echo;
#[cfg(feature = "file-watcher")]
pub mod file_watcher;
pub mod types;
