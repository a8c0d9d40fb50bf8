//! Core error types for setuptask-core

use std::path::PathBuf;

use setuptask_stamp::StampError;
use thiserror::Error;

/// Error returned by a task action, kept as-is for the caller
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result of a task action
pub type TaskResult = Result<(), TaskError>;

/// Errors in how a task set is declared
///
/// These are raised while building a task set, never while running one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DefinitionError {
    /// Two tasks share a name within one task set
    #[error("duplicate setup task: {0}")]
    DuplicateTask(String),

    /// A task was declared without an action
    #[error("setup task has no action: {0}")]
    MissingAction(String),

    /// An ordering constraint or override names a task that is not declared
    #[error("setup task {task} refers to unknown task {reference}")]
    UnknownTask {
        /// Task holding the reference
        task: String,
        /// Name that could not be found
        reference: String,
    },

    /// Before/after constraints form a cycle
    #[error("ordering cycle between setup tasks: {}", tasks.join(" -> "))]
    OrderingCycle {
        /// Tasks along the cycle, first task repeated at the end
        tasks: Vec<String>,
    },
}

/// Errors that can occur while running setup tasks
#[derive(Error, Debug)]
pub enum SetupError {
    /// The task set is not well formed
    #[error(transparent)]
    Definition(#[from] DefinitionError),

    /// A task action (or its hash function) failed
    #[error("setup task {task} failed for {owner}: {source}")]
    Task {
        /// Owner the task ran for
        owner: String,
        /// Failed task
        task: String,
        /// Error returned by the action
        #[source]
        source: TaskError,
    },

    /// Reading or writing a stamp failed
    #[error("stamp error: {0}")]
    Stamp(#[from] StampError),

    /// Individual task lookup failed
    #[error("no setup task named {task} on {owner}")]
    NoSuchTask {
        /// Owner that was searched
        owner: String,
        /// Requested task name
        task: String,
    },
}

impl SetupError {
    /// Check if the error comes from the task declarations
    #[must_use]
    pub fn is_definition(&self) -> bool {
        matches!(self, SetupError::Definition(_))
    }

    /// Check if a task action failed (as opposed to stamp persistence)
    #[must_use]
    pub fn is_task_failure(&self) -> bool {
        matches!(self, SetupError::Task { .. })
    }

    /// Name of the failed task, if a task failed
    #[must_use]
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            SetupError::Task { task, .. } => Some(task),
            _ => None,
        }
    }

    /// The action's own error, if a task failed
    #[must_use]
    pub fn into_task_error(self) -> Option<TaskError> {
        match self {
            SetupError::Task { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised by template-driven tasks
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Templates could not be loaded
    #[error("failed to load templates: {0}")]
    Load(#[source] tera::Error),

    /// A template failed to render
    #[error("failed to render template {template}: {source}")]
    Render {
        /// Template name
        template: String,
        /// Renderer error
        #[source]
        source: tera::Error,
    },

    /// Template variables are not a key/value object
    #[error("template variables for {template} must be an object")]
    InvalidVars {
        /// Template name
        template: String,
    },

    /// Rendered output could not be written
    #[error("failed to write {}: {source}", path.display())]
    Write {
        /// Output path
        path: PathBuf,
        /// I/O error
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_error_converts() {
        let err = SetupError::from(DefinitionError::MissingAction("install".into()));
        assert!(err.is_definition());
        assert!(!err.is_task_failure());
        assert_eq!(err.failed_task(), None);
        assert_eq!(err.to_string(), "setup task has no action: install");
    }

    #[test]
    fn test_task_failure_keeps_source() {
        let err = SetupError::Task {
            owner: "web".into(),
            task: "install".into(),
            source: "exit status 3".into(),
        };
        assert!(err.is_task_failure());
        assert!(!err.is_definition());
        assert_eq!(err.failed_task(), Some("install"));
        assert_eq!(err.into_task_error().unwrap().to_string(), "exit status 3");
    }
}
