//! Rescheduler - 「いまは無理」な task を後ろへ回す
//!
//! # フロー
//! 1. 終端状態の task は拒否
//! 2. `scheduled_at = now + backoff`（一定）
//! 3. TaskStore を RESCHEDULED に更新
//! 4. 同じ priority の entry を backoff 後に見えるよう遅延 publish
//!
//! publish に失敗しても正本は RESCHEDULED のまま残ります（ReaperLoop が拾う）。

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::publisher::EntryPublisher;
use crate::domain::{Task, TaskStatus};
use crate::error::CourierError;
use crate::ports::{Clock, TaskStore};

pub struct Rescheduler {
    store: Arc<dyn TaskStore>,
    publisher: EntryPublisher,
    clock: Arc<dyn Clock>,
    backoff: Duration,
}

impl Rescheduler {
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: EntryPublisher,
        clock: Arc<dyn Clock>,
        backoff: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            backoff,
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// 更新後の task を返す
    pub async fn reschedule(&self, task: &Task) -> Result<Task, CourierError> {
        if task.status.is_terminal() {
            return Err(CourierError::InvalidTransition {
                id: task.id,
                status: task.status,
            });
        }

        let backoff =
            chrono::Duration::from_std(self.backoff).map_err(|_| CourierError::ClockOverflow)?;
        let next_run = self
            .clock
            .now()
            .checked_add_signed(backoff)
            .ok_or(CourierError::ClockOverflow)?;

        let updated = self
            .store
            .update_status(task.id, TaskStatus::Rescheduled, Some(next_run))
            .await?;
        self.publisher.publish(&updated, Some(self.backoff)).await?;

        info!(task_id = %task.id, priority = %task.priority, scheduled_at = %next_run, "task rescheduled");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NewTask, Priority};
    use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore};
    use crate::ports::{DeliveryQueue, FixedClock, QueueSpec};
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;

    const Q: &str = "tasks";
    const BACKOFF: Duration = Duration::from_secs(60);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        rescheduler: Rescheduler,
        store: Arc<InMemoryTaskStore>,
        queue: Arc<InMemoryDeliveryQueue>,
        clock: FixedClock,
    }

    async fn fixture() -> Fixture {
        let clock = FixedClock::new(start());
        let store = Arc::new(InMemoryTaskStore::new(Arc::new(clock.clone())));
        let queue = Arc::new(InMemoryDeliveryQueue::new());
        queue
            .declare_queue(&QueueSpec {
                name: Q.into(),
                durable: true,
                max_priority: Some(10),
            })
            .await
            .unwrap();
        let rescheduler = Rescheduler::new(
            store.clone(),
            EntryPublisher::new(queue.clone(), Q),
            Arc::new(clock.clone()),
            BACKOFF,
        );
        Fixture {
            rescheduler,
            store,
            queue,
            clock,
        }
    }

    async fn pending(store: &InMemoryTaskStore) -> Task {
        store
            .create(NewTask::new(
                Priority::new(5).unwrap(),
                json!({"action": "fetch_data", "entity": "users"}),
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_reschedule_updates_store_and_publishes_delayed() {
        let f = fixture().await;
        let task = pending(&f.store).await;

        let updated = f.rescheduler.reschedule(&task).await.unwrap();
        assert_eq!(updated.status, TaskStatus::Rescheduled);
        assert_eq!(updated.scheduled_at, Some(start() + chrono::Duration::seconds(60)));
        assert_eq!(f.queue.delayed_len(Q), 1);
        assert_eq!(f.queue.ready_len(Q), 0);
    }

    #[tokio::test]
    async fn test_reschedule_twice_advances_from_each_call() {
        let f = fixture().await;
        let task = pending(&f.store).await;

        let first = f.rescheduler.reschedule(&task).await.unwrap();
        f.clock.advance(Duration::from_secs(90));
        let second = f.rescheduler.reschedule(&first).await.unwrap();

        assert_eq!(
            second.scheduled_at,
            Some(start() + chrono::Duration::seconds(150))
        );
        assert!(second.scheduled_at > first.scheduled_at);
        assert_eq!(second.status, TaskStatus::Rescheduled);
        assert_eq!(f.queue.delayed_len(Q), 2);
    }

    #[tokio::test]
    async fn test_terminal_task_is_refused() {
        let f = fixture().await;
        let task = pending(&f.store).await;
        let done = f
            .store
            .update_status(task.id, TaskStatus::Completed, None)
            .await
            .unwrap();

        let err = f.rescheduler.reschedule(&done).await.unwrap_err();
        assert!(matches!(
            err,
            CourierError::InvalidTransition {
                status: TaskStatus::Completed,
                ..
            }
        ));
        assert_eq!(f.queue.delayed_len(Q), 0);
    }
}
