use thiserror::Error;

use crate::config::ConfigError;
use crate::domain::{ErrorKind, InvalidPriority, TaskId, TaskStatus};
use crate::ports::{QueueError, StoreError};
use crate::typed::{CodecError, HandlerError, RegistryError};

#[derive(Debug, Error)]
pub enum CourierError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    InvalidPriority(#[from] InvalidPriority),

    #[error("payload must be a JSON object")]
    InvalidPayload,

    #[error("task {id} is {status} and cannot be rescheduled")]
    InvalidTransition { id: TaskId, status: TaskStatus },

    #[error("handler for action {action} failed: {source}")]
    Handler {
        action: String,
        #[source]
        source: HandlerError,
    },

    #[error("missing actions: {0:?}. These actions were expected but not registered.")]
    MissingActions(Vec<String>),

    #[error("clock overflow while computing the next run time")]
    ClockOverflow,
}

impl CourierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CourierError::Store(e) => e.kind(),
            CourierError::Queue(e) => e.kind(),
            CourierError::Handler { .. } => ErrorKind::Transient,
            CourierError::Registry(_)
            | CourierError::Config(_)
            | CourierError::Codec(_)
            | CourierError::InvalidPriority(_)
            | CourierError::InvalidPayload
            | CourierError::InvalidTransition { .. }
            | CourierError::MissingActions(_)
            | CourierError::ClockOverflow => ErrorKind::Permanent,
        }
    }
}
