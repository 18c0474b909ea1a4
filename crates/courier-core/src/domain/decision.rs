//! Decision model: what the consumer does with a delivery.
//!
//! Two pure steps, both free of side effects:
//! - `assess` looks at the stored task before execution (drop / defer / run).
//! - `resolve` maps a handler `Outcome` to the store transition to apply.
//!
//! The consumer loop performs the resulting actions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Outcome, Task, TaskStatus};

/// Pre-execution verdict for a delivered entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    /// The store has no such task (deleted or never persisted).
    Missing,

    /// Already COMPLETED or FAILED; this is a duplicate delivery.
    Terminal(TaskStatus),

    /// Scheduled in the future; hold the entry back for `wait`.
    NotDue {
        until: DateTime<Utc>,
        wait: Duration,
    },

    /// Eligible now.
    Ready,
}

/// Decide whether a looked-up task may run at `now`.
///
/// `max_wait` caps the deferral so that a task whose schedule is moved earlier
/// is rechecked within that bound.
pub fn assess(task: Option<&Task>, now: DateTime<Utc>, max_wait: Duration) -> Readiness {
    let Some(task) = task else {
        return Readiness::Missing;
    };
    if task.status.is_terminal() {
        return Readiness::Terminal(task.status);
    }
    if task.is_due(now) {
        return Readiness::Ready;
    }
    let until = task.due_at();
    let wait = (until - now).to_std().unwrap_or(Duration::ZERO);
    Readiness::NotDue {
        until,
        wait: wait.min(max_wait),
    }
}

/// What to do with a task whose discriminator has no handler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownActionPolicy {
    /// Mark COMPLETED and move on (avoids poison-task loops).
    #[default]
    Complete,

    /// Mark FAILED so misrouted work stays visible.
    Fail,
}

/// Store transition chosen for an outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Complete,
    Reschedule { reason: String },
    Fail { reason: String },
}

/// Map a handler outcome to a store transition.
pub fn resolve(outcome: &Outcome, policy: UnknownActionPolicy) -> Resolution {
    match outcome {
        Outcome::Completed => Resolution::Complete,
        Outcome::Reschedule { reason } => Resolution::Reschedule {
            reason: reason.clone(),
        },
        Outcome::Failed { reason } => Resolution::Fail {
            reason: reason.clone(),
        },
        Outcome::Unhandled { action } => match policy {
            UnknownActionPolicy::Complete => Resolution::Complete,
            UnknownActionPolicy::Fail => Resolution::Fail {
                reason: format!(
                    "no handler for action {}",
                    action.as_deref().unwrap_or("<missing>")
                ),
            },
        },
    }
}
