//! Task status as recorded by the store.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task status.
///
/// State transitions:
/// - Pending -> Pending (not yet due, deferred in the transport)
/// - Pending -> Rescheduled (throttled or timed out, moved to a later time)
/// - Rescheduled -> Rescheduled (throttled again)
/// - Pending | Rescheduled -> Completed
/// - Pending | Rescheduled -> Failed (unknown action under the strict policy,
///   undecodable payload, or a handler reporting a permanent failure)
///
/// Completed and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Rescheduled,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (from, _) if from.is_terminal() => false,
            (_, TaskStatus::Pending) => self == TaskStatus::Pending,
            _ => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Rescheduled => "RESCHEDULED",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn serializes_as_screaming_snake_case() {
        let s = serde_json::to_string(&TaskStatus::Rescheduled).unwrap();
        assert_eq!(s, "\"RESCHEDULED\"");
    }

    #[rstest]
    #[case(TaskStatus::Pending, TaskStatus::Rescheduled, true)]
    #[case(TaskStatus::Pending, TaskStatus::Completed, true)]
    #[case(TaskStatus::Rescheduled, TaskStatus::Rescheduled, true)]
    #[case(TaskStatus::Rescheduled, TaskStatus::Completed, true)]
    #[case(TaskStatus::Rescheduled, TaskStatus::Failed, true)]
    #[case(TaskStatus::Rescheduled, TaskStatus::Pending, false)]
    #[case(TaskStatus::Completed, TaskStatus::Completed, false)]
    #[case(TaskStatus::Completed, TaskStatus::Rescheduled, false)]
    #[case(TaskStatus::Failed, TaskStatus::Pending, false)]
    fn transitions(#[case] from: TaskStatus, #[case] to: TaskStatus, #[case] allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }
}
