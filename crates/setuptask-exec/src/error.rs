//! Error types for setuptask-exec

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while running a setup command
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Command exited with a non-zero status
    #[error("command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        /// Command line
        command: String,
        /// Exit status code
        status: i32,
        /// Stderr output, trimmed
        stderr: String,
    },

    /// Command timed out
    #[error("command timed out after {timeout:?}")]
    Timeout {
        /// Timeout duration that was exceeded
        timeout: Duration,
    },

    /// Process spawn error
    #[error("failed to spawn process: {0}")]
    SpawnError(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    IoError(String),
}

impl ExecError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Timeout { .. })
    }
}
