//! EntryPublisher - task を指す Queue Entry を配送キューへ流す
//!
//! submission / reschedule / reaper がすべてここを通るので、
//! entry の形式と publish オプション（persistent, priority）が揃います。

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::domain::{QueueEntry, Task};
use crate::ports::{DeliveryQueue, PublishOptions, QueueError};

#[derive(Clone)]
pub struct EntryPublisher {
    queue: Arc<dyn DeliveryQueue>,
    queue_name: String,
}

impl EntryPublisher {
    pub fn new(queue: Arc<dyn DeliveryQueue>, queue_name: impl Into<String>) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// task の priority で persistent に publish する。`delay` があれば遅延配送
    pub async fn publish(&self, task: &Task, delay: Option<Duration>) -> Result<(), QueueError> {
        let entry = QueueEntry::new(task.id, task.priority);
        let mut options = PublishOptions::persistent(task.priority);
        if let Some(delay) = delay {
            options = options.delayed_by(delay);
        }
        let body = entry.encode()?;
        self.queue.publish(&self.queue_name, body, options).await?;
        debug!(task_id = %task.id, priority = %task.priority, delay_ms = delay.map(|d| d.as_millis() as u64), "entry published");
        Ok(())
    }
}
