//! Outcome model: what a handler reports back after one execution.
//!
//! The consumer loop turns an outcome into a store update. Handlers only signal;
//! they never touch the store or the transport themselves.

use serde::{Deserialize, Serialize};

/// Result of executing a task once.
///
/// Serialized with a `kind` tag in SCREAMING_SNAKE_CASE so that log sinks and
/// the status view show COMPLETED / RESCHEDULE / FAILED / UNHANDLED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The unit of work is done.
    Completed,

    /// Not done yet; run again later (throttled, deadline expired, ...).
    Reschedule { reason: String },

    /// Will never succeed; stop retrying.
    Failed { reason: String },

    /// No handler is registered for the payload's discriminator.
    Unhandled { action: Option<String> },
}

impl Outcome {
    pub fn completed() -> Self {
        Self::Completed
    }

    pub fn reschedule(reason: impl Into<String>) -> Self {
        Self::Reschedule {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn unhandled(action: Option<&str>) -> Self {
        Self::Unhandled {
            action: action.map(str::to_string),
        }
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Reschedule { .. } => "reschedule",
            Outcome::Failed { .. } => "failed",
            Outcome::Unhandled { .. } => "unhandled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_kind_serializes_as_required_names() {
        let v = serde_json::to_value(Outcome::completed()).unwrap();
        assert_eq!(v["kind"], "COMPLETED");

        let v = serde_json::to_value(Outcome::reschedule("rate limited")).unwrap();
        assert_eq!(v["kind"], "RESCHEDULE");
        assert_eq!(v["reason"], "rate limited");

        let v = serde_json::to_value(Outcome::unhandled(Some("print"))).unwrap();
        assert_eq!(v["kind"], "UNHANDLED");
        assert_eq!(v["action"], "print");
    }

    #[test]
    fn unhandled_without_discriminator() {
        assert_eq!(
            Outcome::unhandled(None),
            Outcome::Unhandled { action: None }
        );
    }
}
