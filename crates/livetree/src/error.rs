use std::fs;
use std::path::PathBuf;

use crate::tree::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path does not exist or is not a directory: {0}")]
    InvalidPath(PathBuf),

    #[error("Entry unreadable: {path}: {source}")]
    EntryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to watch {path}: {source}")]
    WatchRegistration {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("Watcher unavailable: {0}")]
    WatcherUnavailable(String),

    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Canonicalizes a path, returning the input unchanged if canonicalization fails.
pub fn canonicalize_existing_path(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}
