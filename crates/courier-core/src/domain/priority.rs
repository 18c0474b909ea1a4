//! Transport priority.
//!
//! `Priority` is always the value handed to the queue transport: a higher value
//! is served first. Action selection never looks at it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounded task priority (`0..=Priority::MAX`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct Priority(u8);

/// Rejected priority value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("priority {0} is out of range 0..={max}", max = Priority::MAX)]
pub struct InvalidPriority(pub u8);

impl Priority {
    /// Upper bound accepted at submission (matches the queue's default `max-priority`).
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Result<Self, InvalidPriority> {
        if value > Self::MAX {
            return Err(InvalidPriority(value));
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Cap this priority at a queue's declared maximum.
    pub fn clamp_to(self, max_priority: u8) -> Self {
        Self(self.0.min(max_priority))
    }
}

impl TryFrom<u8> for Priority {
    type Error = InvalidPriority;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(p: Priority) -> Self {
        p.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
