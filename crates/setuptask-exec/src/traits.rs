//! Command executor trait

use std::time::Duration;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::result::CommandResult;

/// Runs shell commands on behalf of setup tasks
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `cmd` to completion
    ///
    /// A non-zero exit is reported in the result, not as an error.
    async fn run(&self, cmd: &str) -> Result<CommandResult, ExecError>;

    /// Run `cmd`, giving up after `timeout`
    async fn run_with_timeout(
        &self,
        cmd: &str,
        timeout: Duration,
    ) -> Result<CommandResult, ExecError>;

    /// Short name of the executor, for logging
    fn executor_type(&self) -> &'static str;
}
