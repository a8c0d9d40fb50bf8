//! Per-task run states and decisions

use std::fmt;

use serde::Serialize;

/// Why a task has to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunReason {
    /// No stamp recorded
    NoStamp,
    /// The invalidator rejected the existing stamp
    Invalidated,
    /// The recomputed hash differs from the stored one
    HashChanged {
        /// Hash in the stamp, if any
        stored: Option<String>,
        /// Freshly computed hash
        current: String,
    },
    /// Explicitly forced by the caller
    Forced,
}

impl fmt::Display for RunReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunReason::NoStamp => write!(f, "no stamp"),
            RunReason::Invalidated => write!(f, "invalidated"),
            RunReason::HashChanged { .. } => write!(f, "hash changed"),
            RunReason::Forced => write!(f, "forced"),
        }
    }
}

/// What the runner will do with a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// `check_completed` reported the work as done
    SkipByCheck,
    /// A valid stamp exists
    SkipCompleted,
    /// The task must run
    Run(RunReason),
}

impl Decision {
    #[must_use]
    pub fn will_run(&self) -> bool {
        matches!(self, Decision::Run(_))
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::SkipByCheck => write!(f, "skip (check completed)"),
            Decision::SkipCompleted => write!(f, "skip (stamped)"),
            Decision::Run(reason) => write!(f, "run ({reason})"),
        }
    }
}

/// Result of one task within a run
///
/// A failing task does not produce an outcome: its error is returned to the
/// caller as [`crate::SetupError::Task`] and the run stops there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOutcome {
    /// Skipped because a valid stamp exists
    SkippedCompleted,
    /// Skipped because `check_completed` returned true
    SkippedByCheck,
    /// Action ran and a fresh stamp was written
    RanSuccess(RunReason),
}

impl TaskOutcome {
    /// Check if the task's action was executed
    #[must_use]
    pub fn ran(&self) -> bool {
        matches!(self, TaskOutcome::RanSuccess(_))
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskOutcome::SkippedCompleted => write!(f, "skipped (completed)"),
            TaskOutcome::SkippedByCheck => write!(f, "skipped (check)"),
            TaskOutcome::RanSuccess(reason) => write!(f, "ran ({reason})"),
        }
    }
}

/// Decision for one task, as computed by a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedTask {
    /// Task name
    pub task: String,
    /// Effective order key
    pub order: i32,
    /// What a run would do
    pub decision: Decision,
}

/// Outcomes of a full setup run, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Owner the run was for
    pub owner: String,
    /// Outcome per task
    pub outcomes: Vec<(String, TaskOutcome)>,
}

impl RunReport {
    /// Outcome of a task in this run
    #[must_use]
    pub fn outcome(&self, task: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, outcome)| outcome)
    }

    /// Names of the tasks whose action executed
    #[must_use]
    pub fn ran(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.ran())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Number of tasks skipped in this run
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| !o.ran()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_queries() {
        let report = RunReport {
            owner: "web".to_string(),
            outcomes: vec![
                ("one".to_string(), TaskOutcome::SkippedCompleted),
                ("two".to_string(), TaskOutcome::RanSuccess(RunReason::NoStamp)),
                ("three".to_string(), TaskOutcome::SkippedByCheck),
            ],
        };

        assert_eq!(report.ran(), vec!["two"]);
        assert_eq!(report.skipped_count(), 2);
        assert_eq!(report.outcome("three"), Some(&TaskOutcome::SkippedByCheck));
        assert_eq!(report.outcome("four"), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Decision::Run(RunReason::Invalidated).to_string(), "run (invalidated)");
        assert_eq!(
            TaskOutcome::RanSuccess(RunReason::Forced).to_string(),
            "ran (forced)"
        );
        assert!(!Decision::SkipCompleted.will_run());
    }
}
