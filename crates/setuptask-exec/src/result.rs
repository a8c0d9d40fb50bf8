//! Result types for command execution

use std::time::Duration;

use serde::Serialize;

use crate::error::ExecError;

/// Result of a command execution
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// Exit status code (0 for success, -1 if killed by a signal)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Combine stdout and stderr
    #[must_use]
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }

    /// Turn a non-zero exit into [`ExecError::CommandFailed`]
    ///
    /// # Errors
    /// Returns error if the command did not succeed
    pub fn into_checked(self, command: &str) -> Result<Self, ExecError> {
        if self.success() {
            Ok(self)
        } else {
            Err(ExecError::CommandFailed {
                command: command.to_string(),
                status: self.status,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}
