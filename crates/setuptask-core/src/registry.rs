//! Task sets: the full, ordered collection of an owner's setup tasks
//!
//! A set is assembled once from directly declared tasks and from capability
//! mixins, validated, and resolved into a fixed execution order.

use std::future::Future;
use std::sync::Arc;

use crate::context::SetupTaskContext;
use crate::descriptor::{ActionFn, DEFAULT_ORDER, ORDER_STEP, TaskBuilder, TaskDescriptor, boxed_action};
use crate::error::{DefinitionError, TaskResult};
use crate::order::{OrderNode, resolve};

/// A reusable group of setup tasks that can be mixed into many owner types
///
/// ```ignore
/// struct AuthorizedKeys;
///
/// impl<O: HasRoot + Send + Sync + 'static> TaskCapability<O> for AuthorizedKeys {
///     fn setup_tasks() -> Vec<TaskBuilder<O>> {
///         vec![setup_task("ssh_authorized_keys").sync_action(|o: &O| install_keys(o.root()))]
///     }
/// }
/// ```
pub trait TaskCapability<O> {
    /// Tasks contributed by this capability
    fn setup_tasks() -> Vec<TaskBuilder<O>>;
}

struct Entry<O> {
    descriptor: TaskDescriptor<O>,
    order: i32,
}

impl<O> Clone for Entry<O> {
    fn clone(&self) -> Self {
        Self {
            descriptor: self.descriptor.clone(),
            order: self.order,
        }
    }
}

/// Validated, ordered setup tasks of one owner type
pub struct TaskSet<O> {
    /// Declaration order
    entries: Vec<Entry<O>>,
    /// Indices into `entries` in execution order
    resolved: Vec<usize>,
}

impl<O> TaskSet<O> {
    /// Start assembling a task set
    #[must_use]
    pub fn builder() -> TaskSetBuilder<O> {
        TaskSetBuilder::new()
    }

    /// A set with no tasks
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            resolved: Vec::new(),
        }
    }

    /// Number of tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a task by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TaskDescriptor<O>> {
        self.entry(name).map(|e| &e.descriptor)
    }

    /// Effective order key of a task
    #[must_use]
    pub fn order_of(&self, name: &str) -> Option<i32> {
        self.entry(name).map(|e| e.order)
    }

    /// Tasks in execution order
    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor<O>> {
        self.resolved.iter().map(|&i| &self.entries[i].descriptor)
    }

    /// Task names in execution order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.iter().map(TaskDescriptor::name).collect()
    }

    /// Add a task to an already built set
    ///
    /// The task gets the next order slot after the last declared task unless
    /// it carries its own order; the execution order is resolved again.
    ///
    /// # Errors
    /// Returns error if the name is taken, a constraint is unknown, or the new
    /// constraints form a cycle; the set is left unchanged in that case
    pub fn add_task(&mut self, descriptor: TaskDescriptor<O>) -> Result<(), DefinitionError> {
        let previous = self.entries.last().map(|e| e.order);
        let order = descriptor
            .order
            .unwrap_or_else(|| previous.map_or(DEFAULT_ORDER, |p| p + ORDER_STEP));

        let mut entries = self.entries.clone();
        entries.push(Entry { descriptor, order });
        let resolved = resolve_entries(&entries)?;

        self.entries = entries;
        self.resolved = resolved;
        Ok(())
    }

    fn entry(&self, name: &str) -> Option<&Entry<O>> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }
}

impl<O> Clone for TaskSet<O> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            resolved: self.resolved.clone(),
        }
    }
}

impl<O> Default for TaskSet<O> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<O> std::fmt::Debug for TaskSet<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(
                self.resolved
                    .iter()
                    .map(|&i| (&self.entries[i].descriptor.name, self.entries[i].order)),
            )
            .finish()
    }
}

fn resolve_entries<O>(entries: &[Entry<O>]) -> Result<Vec<usize>, DefinitionError> {
    let nodes: Vec<OrderNode<'_>> = entries
        .iter()
        .map(|e| OrderNode {
            name: &e.descriptor.name,
            order: e.order,
            before: &e.descriptor.before,
            after: &e.descriptor.after,
        })
        .collect();
    resolve(&nodes)
}

/// Collects declarations for a [`TaskSet`]
///
/// Errors from individual declarations are kept and reported by
/// [`TaskSetBuilder::build`], so a set is either fully valid or rejected.
pub struct TaskSetBuilder<O> {
    tasks: Vec<Result<TaskDescriptor<O>, DefinitionError>>,
    overrides: Vec<(String, ActionFn<O>)>,
}

impl<O> TaskSetBuilder<O> {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            overrides: Vec::new(),
        }
    }

    /// Declare a task
    #[must_use]
    pub fn task(mut self, task: TaskBuilder<O>) -> Self {
        self.tasks.push(task.build());
        self
    }

    /// Add an already finalized task
    #[must_use]
    pub fn descriptor(mut self, descriptor: TaskDescriptor<O>) -> Self {
        self.tasks.push(Ok(descriptor));
        self
    }

    /// Include every task of a capability
    #[must_use]
    pub fn mixin<C: TaskCapability<O>>(mut self) -> Self {
        self.tasks
            .extend(C::setup_tasks().into_iter().map(TaskBuilder::build));
        self
    }

    /// Include every task of another set, in its declaration order
    #[must_use]
    pub fn extend(mut self, other: &TaskSet<O>) -> Self {
        self.tasks
            .extend(other.entries.iter().map(|e| Ok(e.descriptor.clone())));
        self
    }

    /// Validate declarations and resolve the execution order
    ///
    /// # Errors
    /// Returns the first declaration error: missing action, duplicate name,
    /// unknown reference, or ordering cycle
    pub fn build(self) -> Result<TaskSet<O>, DefinitionError> {
        let mut entries: Vec<Entry<O>> = Vec::with_capacity(self.tasks.len());
        let mut previous: Option<i32> = None;

        for task in self.tasks {
            let descriptor = task?;
            if entries.iter().any(|e| e.descriptor.name == descriptor.name) {
                return Err(DefinitionError::DuplicateTask(descriptor.name));
            }
            let order = descriptor
                .order
                .unwrap_or_else(|| previous.map_or(DEFAULT_ORDER, |p| p + ORDER_STEP));
            previous = Some(order);
            entries.push(Entry { descriptor, order });
        }

        for (name, action) in self.overrides {
            let entry = entries
                .iter_mut()
                .find(|e| e.descriptor.name == name)
                .ok_or_else(|| DefinitionError::UnknownTask {
                    task: name.clone(),
                    reference: name.clone(),
                })?;
            entry.descriptor.action = action;
        }

        let resolved = resolve_entries(&entries)?;
        Ok(TaskSet { entries, resolved })
    }
}

impl<O: Send + Sync + 'static> TaskSetBuilder<O> {
    /// Replace the action of a declared task, keeping its name, order,
    /// constraints and companion hooks
    #[must_use]
    pub fn override_action<F, Fut>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(Arc<O>, SetupTaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        self.overrides.push((name.into(), boxed_action(action)));
        self
    }
}

impl<O> Default for TaskSetBuilder<O> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::setup_task;

    struct Machine;

    struct Packages;

    impl TaskCapability<Machine> for Packages {
        fn setup_tasks() -> Vec<TaskBuilder<Machine>> {
            vec![
                setup_task("install").sync_action(|_: &Machine| Ok(())),
                setup_task("upgrade").sync_action(|_: &Machine| Ok(())),
            ]
        }
    }

    fn noop(name: &str) -> TaskBuilder<Machine> {
        setup_task(name).sync_action(|_: &Machine| Ok(()))
    }

    #[test]
    fn test_implicit_orders_follow_declaration() {
        let set = TaskSet::builder()
            .task(noop("one"))
            .task(noop("foo").order(9200))
            .task(noop("three"))
            .build()
            .unwrap();

        assert_eq!(set.order_of("one"), Some(DEFAULT_ORDER));
        assert_eq!(set.order_of("foo"), Some(9200));
        assert_eq!(set.order_of("three"), Some(9200 + ORDER_STEP));
        assert_eq!(set.names(), vec!["one", "foo", "three"]);
    }

    #[test]
    fn test_mixin_tasks_are_merged() {
        let set = TaskSet::builder()
            .task(noop("prepare").order(100))
            .mixin::<Packages>()
            .task(noop("configure").after("install"))
            .build()
            .unwrap();

        assert_eq!(set.len(), 4);
        assert_eq!(set.names(), vec!["prepare", "install", "upgrade", "configure"]);
    }

    #[test]
    fn test_duplicate_name_rejected_at_build() {
        let err = TaskSet::builder()
            .mixin::<Packages>()
            .task(noop("install"))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateTask("install".into()));
    }

    #[test]
    fn test_missing_action_rejected_at_build() {
        let err = TaskSet::<Machine>::builder()
            .task(setup_task("empty"))
            .build()
            .unwrap_err();
        assert_eq!(err, DefinitionError::MissingAction("empty".into()));
    }

    #[test]
    fn test_override_unknown_task() {
        let err = TaskSet::builder()
            .task(noop("one"))
            .override_action("two", |_: Arc<Machine>, _| async { Ok(()) })
            .build()
            .unwrap_err();
        assert!(matches!(err, DefinitionError::UnknownTask { .. }));
    }

    #[test]
    fn test_add_task_keeps_set_valid() {
        let mut set = TaskSet::builder().task(noop("one")).build().unwrap();

        set.add_task(noop("two").build().unwrap()).unwrap();
        assert_eq!(set.order_of("two"), Some(DEFAULT_ORDER + ORDER_STEP));

        let err = set.add_task(noop("one").build().unwrap()).unwrap_err();
        assert_eq!(err, DefinitionError::DuplicateTask("one".into()));

        let err = set
            .add_task(noop("three").before("one").after("one").build().unwrap())
            .unwrap_err();
        assert!(matches!(err, DefinitionError::OrderingCycle { .. }));
        assert_eq!(set.names(), vec!["one", "two"]);
    }

    #[test]
    fn test_extend_copies_declarations() {
        let base = TaskSet::builder().mixin::<Packages>().build().unwrap();
        let set = TaskSet::builder()
            .extend(&base)
            .task(noop("finish"))
            .build()
            .unwrap();
        assert_eq!(set.names(), vec!["install", "upgrade", "finish"]);
    }
}
