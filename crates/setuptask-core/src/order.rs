//! Ordering resolver
//!
//! Tasks are sorted by their order key, ties keeping declaration order. On
//! top of that, every before/after constraint is honored transitively: a task
//! that must run before another is pulled forward to sit just ahead of it,
//! taking the target's place among tasks with the same order key, even when
//! its own order key is larger.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::error::DefinitionError;

/// Ordering input for one task
#[derive(Debug, Clone, Copy)]
pub struct OrderNode<'a> {
    /// Task name
    pub name: &'a str,
    /// Effective order key
    pub order: i32,
    /// Tasks this one must precede
    pub before: &'a [String],
    /// Tasks this one must follow
    pub after: &'a [String],
}

/// Resolve a total order over `nodes`
///
/// Returns indices into `nodes`, first task first.
///
/// # Errors
/// Returns error on duplicate names, references to unknown tasks, or cycles
/// among the before/after constraints
pub fn resolve(nodes: &[OrderNode<'_>]) -> Result<Vec<usize>, DefinitionError> {
    let mut index = HashMap::with_capacity(nodes.len());
    for (i, node) in nodes.iter().enumerate() {
        if index.insert(node.name, i).is_some() {
            return Err(DefinitionError::DuplicateTask(node.name.to_string()));
        }
    }

    let lookup = |task: &str, reference: &str| {
        index
            .get(reference)
            .copied()
            .ok_or_else(|| DefinitionError::UnknownTask {
                task: task.to_string(),
                reference: reference.to_string(),
            })
    };

    // successors[i]: tasks that must run after i
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, node) in nodes.iter().enumerate() {
        for target in node.before {
            let j = lookup(node.name, target)?;
            successors[i].push(j);
        }
        for source in node.after {
            let j = lookup(node.name, source)?;
            successors[j].push(i);
        }
    }
    for succ in &mut successors {
        succ.sort_unstable();
        succ.dedup();
    }

    if let Some(cycle) = find_cycle(&successors) {
        return Err(DefinitionError::OrderingCycle {
            tasks: cycle.into_iter().map(|i| nodes[i].name.to_string()).collect(),
        });
    }

    let rank = effective_ranks(nodes, &successors);

    let mut indegree = vec![0usize; nodes.len()];
    for succ in &successors {
        for &j in succ {
            indegree[j] += 1;
        }
    }

    let mut ready: BinaryHeap<Reverse<(Rank, i32, usize)>> = indegree
        .iter()
        .enumerate()
        .filter(|(_, d)| **d == 0)
        .map(|(i, _)| Reverse((rank[i], nodes[i].order, i)))
        .collect();

    let mut resolved = Vec::with_capacity(nodes.len());
    while let Some(Reverse((_, _, i))) = ready.pop() {
        resolved.push(i);
        for &j in &successors[i] {
            indegree[j] -= 1;
            if indegree[j] == 0 {
                ready.push(Reverse((rank[j], nodes[j].order, j)));
            }
        }
    }

    Ok(resolved)
}

/// Sort position of a task: order key, then declaration index
type Rank = (i32, usize);

/// Earliest position among a task and everything it must precede
///
/// The constraint graph must be acyclic.
fn effective_ranks(nodes: &[OrderNode<'_>], successors: &[Vec<usize>]) -> Vec<Rank> {
    fn visit(
        i: usize,
        nodes: &[OrderNode<'_>],
        successors: &[Vec<usize>],
        rank: &mut [Option<Rank>],
    ) -> Rank {
        if let Some(r) = rank[i] {
            return r;
        }
        let mut r = (nodes[i].order, i);
        for &j in &successors[i] {
            r = r.min(visit(j, nodes, successors, rank));
        }
        rank[i] = Some(r);
        r
    }

    let mut rank = vec![None; nodes.len()];
    (0..nodes.len())
        .map(|i| visit(i, nodes, successors, &mut rank))
        .collect()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Find one cycle in the graph, returned as a closed path
fn find_cycle(successors: &[Vec<usize>]) -> Option<Vec<usize>> {
    fn visit(
        i: usize,
        successors: &[Vec<usize>],
        marks: &mut [Mark],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        marks[i] = Mark::InProgress;
        path.push(i);
        for &j in &successors[i] {
            match marks[j] {
                Mark::InProgress => {
                    let start = path.iter().position(|&p| p == j).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(j);
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(j, successors, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        path.pop();
        marks[i] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; successors.len()];
    let mut path = Vec::new();
    for i in 0..successors.len() {
        if marks[i] == Mark::Unvisited
            && let Some(cycle) = visit(i, successors, &mut marks, &mut path)
        {
            return Some(cycle);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Decl {
        name: &'static str,
        order: i32,
        before: Vec<String>,
        after: Vec<String>,
    }

    fn decl(name: &'static str, order: i32) -> Decl {
        Decl {
            name,
            order,
            before: Vec::new(),
            after: Vec::new(),
        }
    }

    impl Decl {
        fn before(mut self, name: &str) -> Self {
            self.before.push(name.to_string());
            self
        }

        fn after(mut self, name: &str) -> Self {
            self.after.push(name.to_string());
            self
        }
    }

    fn names(decls: &[Decl]) -> Result<Vec<&'static str>, DefinitionError> {
        let nodes: Vec<_> = decls
            .iter()
            .map(|d| OrderNode {
                name: d.name,
                order: d.order,
                before: &d.before,
                after: &d.after,
            })
            .collect();
        Ok(resolve(&nodes)?.into_iter().map(|i| decls[i].name).collect())
    }

    #[test]
    fn test_sorts_by_order_and_keeps_ties_stable() {
        let decls = vec![decl("c", 20), decl("a", 10), decl("b", 20), decl("d", 5)];
        assert_eq!(names(&decls).unwrap(), vec!["d", "a", "c", "b"]);
    }

    #[test]
    fn test_before_overrides_numeric_order() {
        let decls = vec![
            decl("one", 5000),
            decl("foo", 9200),
            decl("three", 9210),
            decl("before_two", 9220).before("foo"),
        ];
        assert_eq!(
            names(&decls).unwrap(),
            vec!["one", "before_two", "foo", "three"]
        );
    }

    #[test]
    fn test_pulled_task_takes_target_place_among_ties() {
        let decls = vec![decl("a", 10), decl("x", 10), decl("c", 30).before("a")];
        assert_eq!(names(&decls).unwrap(), vec!["c", "a", "x"]);

        let decls = vec![
            decl("a", 10),
            decl("x", 10),
            decl("y", 10).after("late"),
            decl("late", 20).before("x"),
        ];
        assert_eq!(names(&decls).unwrap(), vec!["a", "late", "x", "y"]);
    }

    #[test]
    fn test_after_overrides_numeric_order() {
        let decls = vec![decl("late", 1).after("setup"), decl("setup", 100)];
        assert_eq!(names(&decls).unwrap(), vec!["setup", "late"]);
    }

    #[test]
    fn test_before_is_transitive() {
        let decls = vec![
            decl("target", 10),
            decl("middle", 50).before("target"),
            decl("first", 90).before("middle"),
            decl("other", 20),
        ];
        assert_eq!(
            names(&decls).unwrap(),
            vec!["first", "middle", "target", "other"]
        );
    }

    #[test]
    fn test_cycle_is_reported() {
        let decls = vec![
            decl("a", 1).before("b"),
            decl("b", 2).before("c"),
            decl("c", 3).before("a"),
            decl("free", 4),
        ];
        let err = names(&decls).unwrap_err();
        assert_eq!(
            err,
            DefinitionError::OrderingCycle {
                tasks: vec!["a".into(), "b".into(), "c".into(), "a".into()]
            }
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let decls = vec![decl("a", 1).after("a")];
        assert!(matches!(
            names(&decls),
            Err(DefinitionError::OrderingCycle { .. })
        ));
    }

    #[test]
    fn test_unknown_reference() {
        let decls = vec![decl("a", 1).before("missing")];
        assert_eq!(
            names(&decls).unwrap_err(),
            DefinitionError::UnknownTask {
                task: "a".into(),
                reference: "missing".into()
            }
        );
    }

    #[test]
    fn test_duplicate_name() {
        let decls = vec![decl("a", 1), decl("a", 2)];
        assert_eq!(
            names(&decls).unwrap_err(),
            DefinitionError::DuplicateTask("a".into())
        );
    }
}
