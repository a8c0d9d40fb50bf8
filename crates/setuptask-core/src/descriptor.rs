//! Task descriptors and the builder used to declare them
//!
//! A descriptor is one named, idempotent unit of setup work bound to an
//! owner type. Companion hooks (`check_completed`, `invalidator`, `hash`)
//! are attached to the same builder so one logical task keeps one name and
//! one order slot.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use setuptask_stamp::Stamp;

use crate::context::SetupTaskContext;
use crate::error::{DefinitionError, TaskError, TaskResult};

/// Order given to the first task declared without an explicit order
pub const DEFAULT_ORDER: i32 = 5000;

/// Gap between consecutive tasks declared without an explicit order
pub const ORDER_STEP: i32 = 10;

pub(crate) type ActionFn<O> =
    Arc<dyn Fn(Arc<O>, SetupTaskContext) -> BoxFuture<'static, TaskResult> + Send + Sync>;
pub(crate) type CheckFn<O> = Arc<dyn Fn(Arc<O>) -> BoxFuture<'static, bool> + Send + Sync>;
pub(crate) type InvalidatorFn<O> = Arc<dyn Fn(&O, &Stamp) -> bool + Send + Sync>;
pub(crate) type HashFn<O> = Arc<dyn Fn(&O) -> Result<String, TaskError> + Send + Sync>;

pub(crate) fn boxed_action<O, F, Fut>(action: F) -> ActionFn<O>
where
    O: Send + Sync + 'static,
    F: Fn(Arc<O>, SetupTaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    Arc::new(move |owner: Arc<O>, ctx: SetupTaskContext| action(owner, ctx).boxed())
}

/// Start declaring a setup task named `name`
pub fn setup_task<O>(name: impl Into<String>) -> TaskBuilder<O> {
    TaskBuilder::new(name)
}

/// A finalized setup task
pub struct TaskDescriptor<O> {
    pub(crate) name: String,
    pub(crate) description: Option<String>,
    pub(crate) order: Option<i32>,
    pub(crate) before: Vec<String>,
    pub(crate) after: Vec<String>,
    pub(crate) action: ActionFn<O>,
    pub(crate) check_completed: Option<CheckFn<O>>,
    pub(crate) invalidator: Option<InvalidatorFn<O>>,
    pub(crate) hash: Option<HashFn<O>>,
}

impl<O> TaskDescriptor<O> {
    /// Task name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human readable description, falling back to the name
    #[must_use]
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.name)
    }

    /// Explicitly declared order, if any
    #[must_use]
    pub fn declared_order(&self) -> Option<i32> {
        self.order
    }

    /// Tasks this task must run before
    #[must_use]
    pub fn before(&self) -> &[String] {
        &self.before
    }

    /// Tasks this task must run after
    #[must_use]
    pub fn after(&self) -> &[String] {
        &self.after
    }

    #[must_use]
    pub fn has_check_completed(&self) -> bool {
        self.check_completed.is_some()
    }

    #[must_use]
    pub fn has_invalidator(&self) -> bool {
        self.invalidator.is_some()
    }

    #[must_use]
    pub fn has_hash(&self) -> bool {
        self.hash.is_some()
    }

    pub(crate) fn compute_hash(&self, owner: &O) -> Result<Option<String>, TaskError> {
        self.hash.as_ref().map(|hash| hash(owner)).transpose()
    }
}

impl<O> Clone for TaskDescriptor<O> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            order: self.order,
            before: self.before.clone(),
            after: self.after.clone(),
            action: Arc::clone(&self.action),
            check_completed: self.check_completed.clone(),
            invalidator: self.invalidator.clone(),
            hash: self.hash.clone(),
        }
    }
}

impl<O> fmt::Debug for TaskDescriptor<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("check_completed", &self.has_check_completed())
            .field("invalidator", &self.has_invalidator())
            .field("hash", &self.has_hash())
            .finish_non_exhaustive()
    }
}

/// Accumulates an action and its companion hooks for one task
pub struct TaskBuilder<O> {
    name: String,
    description: Option<String>,
    order: Option<i32>,
    before: Vec<String>,
    after: Vec<String>,
    action: Option<ActionFn<O>>,
    check_completed: Option<CheckFn<O>>,
    invalidator: Option<InvalidatorFn<O>>,
    hash: Option<HashFn<O>>,
}

impl<O> TaskBuilder<O> {
    /// Start declaring a task
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            order: None,
            before: Vec::new(),
            after: Vec::new(),
            action: None,
            check_completed: None,
            invalidator: None,
            hash: None,
        }
    }

    /// Name of the task being declared
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set an explicit order key
    #[must_use]
    pub fn order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    /// Require this task to run before `task`
    #[must_use]
    pub fn before(mut self, task: impl Into<String>) -> Self {
        self.before.push(task.into());
        self
    }

    /// Require this task to run after `task`
    #[must_use]
    pub fn after(mut self, task: impl Into<String>) -> Self {
        self.after.push(task.into());
        self
    }

    /// Set a human readable description
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Finalize the task
    ///
    /// # Errors
    /// Returns error if no action was attached
    pub fn build(self) -> Result<TaskDescriptor<O>, DefinitionError> {
        let action = self
            .action
            .ok_or_else(|| DefinitionError::MissingAction(self.name.clone()))?;
        Ok(TaskDescriptor {
            name: self.name,
            description: self.description,
            order: self.order,
            before: self.before,
            after: self.after,
            action,
            check_completed: self.check_completed,
            invalidator: self.invalidator,
            hash: self.hash,
        })
    }
}

impl<O: Send + Sync + 'static> TaskBuilder<O> {
    /// Attach an async action
    ///
    /// The action receives the owner and the context of this task execution.
    #[must_use]
    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(Arc<O>, SetupTaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.action = Some(boxed_action(action));
        self
    }

    /// Attach a synchronous action
    #[must_use]
    pub fn sync_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&O) -> TaskResult + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(move |owner: Arc<O>, _ctx: SetupTaskContext| {
            futures::future::ready(action(&owner)).boxed()
        }));
        self
    }

    /// Treat the task as satisfied whenever `check` returns true
    ///
    /// The stamp is neither consulted nor written in that case.
    #[must_use]
    pub fn check_completed<F>(mut self, check: F) -> Self
    where
        F: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.check_completed = Some(Arc::new(move |owner: Arc<O>| {
            futures::future::ready(check(&owner)).boxed()
        }));
        self
    }

    /// Async variant of [`TaskBuilder::check_completed`]
    #[must_use]
    pub fn check_completed_async<F, Fut>(mut self, check: F) -> Self
    where
        F: Fn(Arc<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.check_completed = Some(Arc::new(move |owner: Arc<O>| check(owner).boxed()));
        self
    }

    /// Attach an invalidator, consulted only when a stamp exists
    ///
    /// Returning `false` marks the task stale and forces it to run again.
    #[must_use]
    pub fn invalidator<F>(mut self, invalidator: F) -> Self
    where
        F: Fn(&O, &Stamp) -> bool + Send + Sync + 'static,
    {
        self.invalidator = Some(Arc::new(invalidator));
        self
    }

    /// Attach a hash function; the task reruns whenever the hash changes
    #[must_use]
    pub fn hash<F>(mut self, hash: F) -> Self
    where
        F: Fn(&O) -> String + Send + Sync + 'static,
    {
        self.hash = Some(Arc::new(move |owner: &O| Ok::<_, TaskError>(hash(owner))));
        self
    }

    /// Fallible variant of [`TaskBuilder::hash`]
    #[must_use]
    pub fn try_hash<F>(mut self, hash: F) -> Self
    where
        F: Fn(&O) -> Result<String, TaskError> + Send + Sync + 'static,
    {
        self.hash = Some(Arc::new(hash));
        self
    }
}

impl<O> fmt::Debug for TaskBuilder<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskBuilder")
            .field("name", &self.name)
            .field("order", &self.order)
            .field("action", &self.action.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Owner {
        hash: String,
    }

    #[test]
    fn test_build_requires_action() {
        let err = setup_task::<Owner>("install").order(10).build().unwrap_err();
        assert_eq!(err, DefinitionError::MissingAction("install".to_string()));
    }

    #[test]
    fn test_companions_attach_to_one_task() {
        let task = setup_task::<Owner>("render")
            .description("render config")
            .sync_action(|_| Ok(()))
            .check_completed(|_| false)
            .invalidator(|_, _| true)
            .hash(|o| o.hash.clone())
            .build()
            .unwrap();

        assert_eq!(task.name(), "render");
        assert_eq!(task.description(), "render config");
        assert!(task.has_check_completed());
        assert!(task.has_invalidator());
        assert!(task.has_hash());

        let owner = Owner {
            hash: "30".to_string(),
        };
        assert_eq!(task.compute_hash(&owner).unwrap().as_deref(), Some("30"));
    }

    #[test]
    fn test_description_defaults_to_name() {
        let task = setup_task::<Owner>("install")
            .sync_action(|_| Ok(()))
            .build()
            .unwrap();
        assert_eq!(task.description(), "install");
        assert_eq!(task.declared_order(), None);
        assert!(task.compute_hash(&Owner { hash: String::new() }).unwrap().is_none());
    }
}
