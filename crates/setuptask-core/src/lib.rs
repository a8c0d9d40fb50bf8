//! setuptask-core: Idempotent, ordered setup tasks
//!
//! Owners declare named setup tasks with optional ordering constraints,
//! completion checks, invalidators and content hashes. The [`TaskRunner`]
//! runs them in resolved order and records a stamp per completed task, so
//! repeated runs only redo work that is missing or stale.

pub mod context;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod order;
pub mod owner;
pub mod registry;
pub mod runner;
pub mod state;
pub mod template;

pub use context::{ContextGuard, ContextKey, ContextTracker, SetupTaskContext};
pub use descriptor::{DEFAULT_ORDER, ORDER_STEP, TaskBuilder, TaskDescriptor, setup_task};
pub use digest::{content_hash, files_hash};
pub use error::{DefinitionError, SetupError, TaskError, TaskResult, TemplateError};
pub use owner::SetupTaskOwner;
pub use registry::{TaskCapability, TaskSet, TaskSetBuilder};
pub use runner::TaskRunner;
pub use state::{Decision, PlannedTask, RunReason, RunReport, TaskOutcome};
pub use template::{TemplateRenderer, TemplateTask, TeraRenderer};

pub use setuptask_stamp::{FsStampStore, MemoryStampStore, Stamp, StampError, StampStore};
