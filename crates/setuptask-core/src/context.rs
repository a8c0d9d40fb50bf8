//! Instantiation contexts
//!
//! A [`SetupTaskContext`] names what is currently executing (an owner's full
//! run, or one of its tasks) and links to the context that triggered it.
//! Contexts are threaded explicitly: entry points take the parent context and
//! task actions receive their own, so a task that provisions a dependent
//! owner passes its context down as that owner's parent.
//!
//! [`ContextTracker`] additionally keeps the stack of active contexts for
//! introspection from outside the running task.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

/// Identifies what a context is executing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKey {
    /// Full setup run of an owner
    Instantiation {
        /// Owner name
        owner: String,
    },
    /// A single setup task of an owner
    Task {
        /// Owner name
        owner: String,
        /// Task name
        task: String,
    },
}

impl ContextKey {
    /// Owner this context belongs to
    #[must_use]
    pub fn owner(&self) -> &str {
        match self {
            ContextKey::Instantiation { owner } | ContextKey::Task { owner, .. } => owner,
        }
    }

    /// Task name, for task contexts
    #[must_use]
    pub fn task(&self) -> Option<&str> {
        match self {
            ContextKey::Instantiation { .. } => None,
            ContextKey::Task { task, .. } => Some(task),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Instantiation { owner } => write!(f, "{owner}"),
            ContextKey::Task { owner, task } => write!(f, "{owner}::{task}"),
        }
    }
}

struct ContextFrame {
    key: ContextKey,
    instance: Arc<dyn Any + Send + Sync>,
    parent: Option<SetupTaskContext>,
}

/// One in-flight instantiation or task execution
///
/// Cheap to clone; clones refer to the same context.
#[derive(Clone)]
pub struct SetupTaskContext {
    frame: Arc<ContextFrame>,
}

impl SetupTaskContext {
    /// Create a context nested inside `parent`
    pub fn new(
        key: ContextKey,
        instance: Arc<dyn Any + Send + Sync>,
        parent: Option<SetupTaskContext>,
    ) -> Self {
        Self {
            frame: Arc::new(ContextFrame {
                key,
                instance,
                parent,
            }),
        }
    }

    /// What this context is executing
    #[must_use]
    pub fn key(&self) -> &ContextKey {
        &self.frame.key
    }

    /// The owning object, type-erased
    #[must_use]
    pub fn instance(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.frame.instance
    }

    /// The owning object as a concrete type
    #[must_use]
    pub fn instance_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.frame.instance).downcast::<T>().ok()
    }

    /// Check whether `instance` is this context's owning object
    #[must_use]
    pub fn is_instance<T: Any + Send + Sync>(&self, instance: &Arc<T>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.frame.instance), Arc::as_ptr(instance))
    }

    /// Enclosing context
    #[must_use]
    pub fn parent(&self) -> Option<&SetupTaskContext> {
        self.frame.parent.as_ref()
    }

    /// Enclosing contexts, innermost first
    pub fn ancestors(&self) -> impl Iterator<Item = &SetupTaskContext> {
        std::iter::successors(self.parent(), |ctx| ctx.parent())
    }

    /// Number of enclosing contexts
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors().count()
    }

    /// Check whether both handles refer to the same context
    #[must_use]
    pub fn same_as(&self, other: &SetupTaskContext) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame)
    }
}

impl fmt::Debug for SetupTaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupTaskContext")
            .field("key", &self.frame.key)
            .field("parent", &self.parent().map(SetupTaskContext::key))
            .finish_non_exhaustive()
    }
}

/// Stack of active contexts
///
/// Clones share the same stack. Entries are pushed by [`ContextTracker::enter`]
/// and popped when the returned guard drops, whether the work succeeded,
/// failed, or was cancelled.
#[derive(Clone, Default)]
pub struct ContextTracker {
    stack: Arc<Mutex<Vec<SetupTaskContext>>>,
}

impl ContextTracker {
    /// Create an empty tracker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Innermost active context, if any
    #[must_use]
    pub fn current_instantiation(&self) -> Option<SetupTaskContext> {
        self.stack.lock().last().cloned()
    }

    /// Number of active contexts
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Push `ctx`, popping it again when the guard drops
    #[must_use = "the context is released as soon as the guard is dropped"]
    pub fn enter(&self, ctx: SetupTaskContext) -> ContextGuard {
        self.stack.lock().push(ctx.clone());
        ContextGuard {
            tracker: self.clone(),
            ctx,
        }
    }
}

impl fmt::Debug for ContextTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stack = self.stack.lock();
        f.debug_list()
            .entries(stack.iter().map(SetupTaskContext::key))
            .finish()
    }
}

/// Releases a tracked context on drop
#[derive(Debug)]
pub struct ContextGuard {
    tracker: ContextTracker,
    ctx: SetupTaskContext,
}

impl ContextGuard {
    /// The context held by this guard
    #[must_use]
    pub fn context(&self) -> &SetupTaskContext {
        &self.ctx
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let mut stack = self.tracker.stack.lock();
        if let Some(pos) = stack.iter().rposition(|c| c.same_as(&self.ctx)) {
            stack.remove(pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instantiation(owner: &str, parent: Option<SetupTaskContext>) -> SetupTaskContext {
        SetupTaskContext::new(
            ContextKey::Instantiation {
                owner: owner.to_string(),
            },
            Arc::new(owner.to_string()),
            parent,
        )
    }

    #[test]
    fn test_tracker_is_lifo() {
        let tracker = ContextTracker::new();
        assert!(tracker.current_instantiation().is_none());

        let outer = instantiation("outer", None);
        let outer_guard = tracker.enter(outer.clone());
        {
            let inner = instantiation("inner", Some(outer.clone()));
            let _inner_guard = tracker.enter(inner.clone());
            let current = tracker.current_instantiation().unwrap();
            assert!(current.same_as(&inner));
            assert!(current.parent().unwrap().same_as(&outer));
            assert_eq!(tracker.depth(), 2);
        }

        assert!(tracker.current_instantiation().unwrap().same_as(&outer));
        drop(outer_guard);
        assert!(tracker.current_instantiation().is_none());
    }

    #[test]
    fn test_instance_downcast() {
        let owner = Arc::new(42_u32);
        let ctx = SetupTaskContext::new(
            ContextKey::Task {
                owner: "n".to_string(),
                task: "t".to_string(),
            },
            owner.clone(),
            None,
        );

        assert_eq!(ctx.instance_as::<u32>().as_deref(), Some(&42));
        assert!(ctx.instance_as::<String>().is_none());
        assert!(ctx.is_instance(&owner));
        assert!(!ctx.is_instance(&Arc::new(42_u32)));
        assert_eq!(ctx.key().to_string(), "n::t");
    }

    #[test]
    fn test_ancestors() {
        let root = instantiation("root", None);
        let mid = instantiation("mid", Some(root.clone()));
        let leaf = instantiation("leaf", Some(mid.clone()));

        let owners: Vec<_> = leaf.ancestors().map(|c| c.key().owner().to_string()).collect();
        assert_eq!(owners, vec!["mid", "root"]);
        assert_eq!(leaf.depth(), 2);
        assert_eq!(root.depth(), 0);
    }
}
