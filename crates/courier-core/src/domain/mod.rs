//! Domain model (IDs, tasks, queue entries, outcomes, decisions).
//!
//! I/O を持たない純粋な型だけを置きます。

pub mod decision;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod priority;
pub mod state;
pub mod task;

pub use decision::{Readiness, Resolution, UnknownActionPolicy, assess, resolve};
pub use envelope::{EntryCodecError, QueueEntry};
pub use errors::ErrorKind;
pub use ids::{Id, IdMarker, ParseIdError, TaskId};
pub use outcome::Outcome;
pub use priority::{InvalidPriority, Priority};
pub use state::TaskStatus;
pub use task::{NewTask, Task};
