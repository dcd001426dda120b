use std::path::PathBuf;

/// Change notification resolved against the tracked file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A tracked board file's content changed.
    BoardChanged { path: PathBuf },
    /// A tracked board file appeared (after deletion or initial creation).
    BoardCreated { path: PathBuf },
    /// A tracked board file was removed.
    BoardRemoved { path: PathBuf },
    /// The configuration document changed.
    ConfigChanged,
}
