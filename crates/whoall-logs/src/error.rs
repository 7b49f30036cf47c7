use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while reading newly appended log bytes.
///
/// These are transient: the cursor is left where it was and the read is
/// retried on the next cycle.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("failed to open log file {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to stat log file {path}: {source}")]
    Metadata { path: PathBuf, source: io::Error },

    #[error("failed to read log file {path} at offset {offset}: {source}")]
    Read {
        path: PathBuf,
        offset: u64,
        source: io::Error,
    },
}

/// Failure while setting up the filesystem observer. Fatal at startup.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("log path {0} has no parent directory to watch")]
    NoParent(PathBuf),

    #[error("watch directory {0} does not exist")]
    MissingDirectory(PathBuf),

    #[error("failed to watch {path}: {source}")]
    Notify {
        path: PathBuf,
        source: notify::Error,
    },
}
