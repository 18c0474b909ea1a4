use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Priority, TaskId, TaskStatus};

/// What the submission API hands to the core.
///
/// Field names follow the submission wire format (`scheduledAt`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub priority: Priority,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn new(priority: Priority, payload: serde_json::Value) -> Self {
        Self {
            priority,
            payload,
            scheduled_at: None,
        }
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}

/// The durable task record owned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub priority: Priority,
    pub payload: serde_json::Value,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Build a fresh PENDING record.
    pub fn create(id: TaskId, new: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            priority: new.priority,
            payload: new.payload,
            scheduled_at: new.scheduled_at,
            status: TaskStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// The payload's `action` discriminator, if any.
    pub fn action(&self) -> Option<&str> {
        self.payload.get("action").and_then(|v| v.as_str())
    }

    /// Eligible to run at `now` (no schedule, or the schedule has elapsed).
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| at <= now)
    }

    /// The instant from which this task is expected to be runnable.
    pub fn due_at(&self) -> DateTime<Utc> {
        self.scheduled_at.unwrap_or(self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
    }

    fn task(scheduled_at: Option<DateTime<Utc>>) -> Task {
        let new = NewTask {
            priority: Priority::new(3).unwrap(),
            payload: serde_json::json!({"action": "send_email", "recipient": "a@b.com"}),
            scheduled_at,
        };
        Task::create(TaskId::from_ulid(Ulid::new()), new, at(12, 0))
    }

    #[test]
    fn new_task_parses_submission_shape() {
        let raw = r#"{"priority":1,"payload":{"action":"send_email"},"scheduledAt":null}"#;
        let new: NewTask = serde_json::from_str(raw).unwrap();
        assert_eq!(new.priority.value(), 1);
        assert_eq!(new.scheduled_at, None);

        let raw = r#"{"priority":2,"payload":{}}"#;
        let new: NewTask = serde_json::from_str(raw).unwrap();
        assert_eq!(new.scheduled_at, None);
    }

    #[test]
    fn created_task_is_pending() {
        let t = task(None);
        assert_eq!(t.status, TaskStatus::Pending);
        assert_eq!(t.action(), Some("send_email"));
    }

    #[test]
    fn unscheduled_task_is_always_due() {
        assert!(task(None).is_due(at(0, 0)));
    }

    #[test]
    fn scheduled_task_is_due_from_its_instant() {
        let t = task(Some(at(12, 30)));
        assert!(!t.is_due(at(12, 29)));
        assert!(t.is_due(at(12, 30)));
        assert!(t.is_due(at(12, 30) + Duration::seconds(1)));
    }

    #[test]
    fn due_at_falls_back_to_creation() {
        assert_eq!(task(None).due_at(), at(12, 0));
        assert_eq!(task(Some(at(13, 0))).due_at(), at(13, 0));
    }
}
