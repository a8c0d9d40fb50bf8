//! setuptask-exec: Shell command execution for setup tasks
//!
//! Provides the [`CommandExecutor`] trait and a local implementation that
//! runs commands through `sh -c`.

pub mod error;
pub mod local;
pub mod result;
pub mod traits;

pub use error::ExecError;
pub use local::LocalExecutor;
pub use result::CommandResult;
pub use traits::CommandExecutor;
