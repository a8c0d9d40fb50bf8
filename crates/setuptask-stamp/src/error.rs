//! Error types for setuptask-stamp

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading or writing stamps
#[derive(Error, Debug)]
pub enum StampError {
    /// Filesystem operation failed
    #[error("stamp I/O error at {}: {source}", path.display())]
    Io {
        /// Path that was being accessed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Stamp file exists but cannot be decoded
    #[error("corrupt stamp at {}: {source}", path.display())]
    Corrupt {
        /// Path of the unreadable stamp
        path: PathBuf,
        /// Decoding error
        #[source]
        source: serde_json::Error,
    },

    /// Task name cannot be used as a stamp key
    #[error("invalid task name for stamp: {0:?}")]
    InvalidName(String),
}

impl StampError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StampError::Io {
            path: path.into(),
            source,
        }
    }
}
