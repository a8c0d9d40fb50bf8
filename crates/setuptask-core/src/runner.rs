//! Task runner
//!
//! Walks an owner's tasks in resolved order. For each task:
//! 1. `check_completed` returning true skips the task without touching the stamp.
//! 2. A missing stamp means the task runs.
//! 3. An invalidator returning false means the task runs.
//! 4. A hash function whose value differs from the stored hash means the task runs.
//! 5. Otherwise the task is skipped as completed.
//!
//! A task that runs has its stamp deleted first, so an action that fails or is
//! cancelled never leaves a stamp behind. On success a new stamp is written
//! with the freshly computed hash.

use std::any::Any;
use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use setuptask_stamp::{Stamp, StampStore};
use tracing::{debug, error, info, instrument};

use crate::context::{ContextKey, ContextTracker, SetupTaskContext};
use crate::descriptor::TaskDescriptor;
use crate::error::{SetupError, TaskError};
use crate::owner::SetupTaskOwner;
use crate::registry::TaskSet;
use crate::state::{Decision, PlannedTask, RunReason, RunReport, TaskOutcome};

/// Executes setup tasks against a stamp store
///
/// Clones share the store and the context tracker.
#[derive(Clone)]
pub struct TaskRunner {
    store: Arc<dyn StampStore>,
    tracker: ContextTracker,
}

impl TaskRunner {
    /// Create a runner persisting stamps in `store`
    pub fn new(store: Arc<dyn StampStore>) -> Self {
        Self {
            store,
            tracker: ContextTracker::new(),
        }
    }

    /// Use an existing context tracker
    #[must_use]
    pub fn with_tracker(mut self, tracker: ContextTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Stamp store used by this runner
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StampStore> {
        &self.store
    }

    /// Tracker of the contexts currently executing
    #[must_use]
    pub fn tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    /// Innermost instantiation or task currently executing
    #[must_use]
    pub fn current_instantiation(&self) -> Option<SetupTaskContext> {
        self.tracker.current_instantiation()
    }

    /// Look up the stamp of one of `owner`'s tasks
    ///
    /// # Errors
    /// Returns error if the stamp cannot be read
    pub fn check_stamp<O: SetupTaskOwner>(
        &self,
        owner: &O,
        task: &str,
    ) -> Result<Option<Stamp>, SetupError> {
        Ok(self.store.check(&owner.stamp_path(), task)?)
    }

    /// Run every task of `owner` in order
    ///
    /// Stops at the first failing task and returns its error; tasks completed
    /// before it keep their stamps, so running again resumes at the failed
    /// task.
    ///
    /// # Errors
    /// Returns [`SetupError::Task`] if an action fails and
    /// [`SetupError::Stamp`] if stamps cannot be read or written
    #[instrument(skip_all, fields(owner = %owner.owner_name()))]
    pub async fn run_setup_tasks<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        tasks: &TaskSet<O>,
        parent: Option<&SetupTaskContext>,
    ) -> Result<RunReport, SetupError> {
        let owner_name = owner.owner_name();
        let instance: Arc<dyn Any + Send + Sync> = owner.clone();
        let ctx = SetupTaskContext::new(
            ContextKey::Instantiation {
                owner: owner_name.clone(),
            },
            instance,
            parent.cloned(),
        );
        let _guard = self.tracker.enter(ctx.clone());

        info!(tasks = tasks.len(), "running setup tasks");

        let mut report = RunReport {
            owner: owner_name.clone(),
            outcomes: Vec::with_capacity(tasks.len()),
        };
        for task in tasks.iter() {
            let decision = self.evaluate(owner, &owner_name, task).await?;
            let outcome = self
                .apply(owner, &owner_name, task, decision, Some(&ctx))
                .await?;
            report.outcomes.push((task.name().to_string(), outcome));
        }

        info!(
            ran = report.ran().len(),
            skipped = report.skipped_count(),
            "setup tasks complete"
        );
        Ok(report)
    }

    /// Run one task of `owner`, applying its own completion checks
    ///
    /// Other tasks are neither consulted nor run.
    ///
    /// # Errors
    /// Returns error if the task is unknown, its action fails, or its stamp
    /// cannot be accessed
    #[instrument(skip(self, owner, tasks, parent), fields(owner = %owner.owner_name()))]
    pub async fn run_task<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        tasks: &TaskSet<O>,
        name: &str,
        parent: Option<&SetupTaskContext>,
    ) -> Result<TaskOutcome, SetupError> {
        let owner_name = owner.owner_name();
        let task = lookup(tasks, &owner_name, name)?;
        let decision = self.evaluate(owner, &owner_name, task).await?;
        self.apply(owner, &owner_name, task, decision, parent).await
    }

    /// Run one task of `owner` unconditionally
    ///
    /// Completion checks are bypassed; the stamp is deleted before the action
    /// and rewritten only if it succeeds.
    ///
    /// # Errors
    /// Returns error if the task is unknown, its action fails, or its stamp
    /// cannot be accessed
    #[instrument(skip(self, owner, tasks, parent), fields(owner = %owner.owner_name()))]
    pub async fn force_task<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        tasks: &TaskSet<O>,
        name: &str,
        parent: Option<&SetupTaskContext>,
    ) -> Result<TaskOutcome, SetupError> {
        let owner_name = owner.owner_name();
        let task = lookup(tasks, &owner_name, name)?;
        self.execute(owner, &owner_name, task, RunReason::Forced, parent)
            .await
    }

    /// Decide what a run would do for every task, without running anything
    ///
    /// Decisions are computed against the current stamps; a task that would
    /// run does not affect the decisions of the tasks after it.
    ///
    /// # Errors
    /// Returns error if stamps cannot be read or a hash function fails
    #[instrument(skip_all, fields(owner = %owner.owner_name()))]
    pub async fn plan<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        tasks: &TaskSet<O>,
    ) -> Result<Vec<PlannedTask>, SetupError> {
        let owner_name = owner.owner_name();
        let mut plan = Vec::with_capacity(tasks.len());
        for task in tasks.iter() {
            let decision = self.evaluate(owner, &owner_name, task).await?;
            plan.push(PlannedTask {
                task: task.name().to_string(),
                order: tasks.order_of(task.name()).unwrap_or_default(),
                decision,
            });
        }
        Ok(plan)
    }

    async fn evaluate<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        owner_name: &str,
        task: &TaskDescriptor<O>,
    ) -> Result<Decision, SetupError> {
        if let Some(check) = &task.check_completed
            && check(Arc::clone(owner)).await
        {
            return Ok(Decision::SkipByCheck);
        }

        let Some(stamp) = self.store.check(&owner.stamp_path(), task.name())? else {
            return Ok(Decision::Run(RunReason::NoStamp));
        };

        if let Some(invalidator) = &task.invalidator
            && !invalidator(owner.as_ref(), &stamp)
        {
            return Ok(Decision::Run(RunReason::Invalidated));
        }

        let current = task
            .compute_hash(owner.as_ref())
            .map_err(|source| task_failure(owner_name, task.name(), source))?;
        if let Some(current) = current
            && !stamp.hash_matches(&current)
        {
            return Ok(Decision::Run(RunReason::HashChanged {
                stored: stamp.hash,
                current,
            }));
        }

        Ok(Decision::SkipCompleted)
    }

    async fn apply<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        owner_name: &str,
        task: &TaskDescriptor<O>,
        decision: Decision,
        parent: Option<&SetupTaskContext>,
    ) -> Result<TaskOutcome, SetupError> {
        match decision {
            Decision::SkipByCheck => {
                debug!(task = %task.name(), "setup task already satisfied");
                Ok(TaskOutcome::SkippedByCheck)
            }
            Decision::SkipCompleted => {
                debug!(task = %task.name(), "setup task stamped, skipping");
                Ok(TaskOutcome::SkippedCompleted)
            }
            Decision::Run(reason) => self.execute(owner, owner_name, task, reason, parent).await,
        }
    }

    async fn execute<O: SetupTaskOwner>(
        &self,
        owner: &Arc<O>,
        owner_name: &str,
        task: &TaskDescriptor<O>,
        reason: RunReason,
        parent: Option<&SetupTaskContext>,
    ) -> Result<TaskOutcome, SetupError> {
        let stamp_path = owner.stamp_path();
        let instance: Arc<dyn Any + Send + Sync> = owner.clone();
        let ctx = SetupTaskContext::new(
            ContextKey::Task {
                owner: owner_name.to_string(),
                task: task.name().to_string(),
            },
            instance,
            parent.cloned(),
        );
        let _guard = self.tracker.enter(ctx.clone());

        self.store.delete(&stamp_path, task.name())?;

        info!(task = %task.name(), reason = %reason, "running setup task: {}", task.description());
        let started = Instant::now();

        if let Err(source) = (task.action)(Arc::clone(owner), ctx).await {
            error!(task = %task.name(), error = %source, "setup task failed");
            return Err(task_failure(owner_name, task.name(), source));
        }

        let hash = task
            .compute_hash(owner.as_ref())
            .map_err(|source| task_failure(owner_name, task.name(), source))?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.store.create(
            &stamp_path,
            task.name(),
            hash.as_deref(),
            Some(json!({ "reason": reason.to_string(), "elapsed_ms": elapsed_ms })),
        )?;

        info!(task = %task.name(), elapsed_ms, "setup task complete");
        Ok(TaskOutcome::RanSuccess(reason))
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("store", &self.store.store_type())
            .field("tracker", &self.tracker)
            .finish()
    }
}

fn lookup<'a, O>(
    tasks: &'a TaskSet<O>,
    owner: &str,
    name: &str,
) -> Result<&'a TaskDescriptor<O>, SetupError> {
    tasks.get(name).ok_or_else(|| SetupError::NoSuchTask {
        owner: owner.to_string(),
        task: name.to_string(),
    })
}

fn task_failure(owner: &str, task: &str, source: TaskError) -> SetupError {
    SetupError::Task {
        owner: owner.to_string(),
        task: task.to_string(),
        source,
    }
}
