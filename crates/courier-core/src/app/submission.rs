//! Submitter - Task Submission API の境界
//!
//! # フロー
//! 1. payload を検査（JSON object であること）
//! 2. TaskStore::create() で PENDING の正本を作る
//! 3. task の priority で entry を 1 件 publish する
//!
//! publish に失敗した場合は呼び出し側にエラーを返します。正本は PENDING の
//! まま残り、ReaperLoop が拾い直します。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use super::publisher::EntryPublisher;
use crate::domain::{NewTask, Priority, TaskId};
use crate::error::CourierError;
use crate::ports::TaskStore;
use crate::typed::{Action, PayloadCodec};

#[derive(Clone)]
pub struct Submitter {
    store: Arc<dyn TaskStore>,
    publisher: EntryPublisher,
}

impl Submitter {
    pub fn new(store: Arc<dyn TaskStore>, publisher: EntryPublisher) -> Self {
        Self { store, publisher }
    }

    pub async fn create_task(&self, new: NewTask) -> Result<TaskId, CourierError> {
        if !new.payload.is_object() {
            return Err(CourierError::InvalidPayload);
        }

        let task = self.store.create(new).await?;
        if let Err(e) = self.publisher.publish(&task, None).await {
            error!(task_id = %task.id, error = %e, "task stored but not published");
            return Err(e.into());
        }

        info!(
            task_id = %task.id,
            priority = %task.priority,
            action = task.action().unwrap_or("<none>"),
            scheduled_at = ?task.scheduled_at,
            "task submitted"
        );
        Ok(task.id)
    }

    /// 型付き action から payload を組み立てて投入する
    pub async fn submit<A: Action>(
        &self,
        priority: Priority,
        action: &A,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<TaskId, CourierError> {
        let mut new = NewTask::new(priority, PayloadCodec::encode(action)?);
        new.scheduled_at = scheduled_at;
        self.create_task(new).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QueueEntry, TaskStatus};
    use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore};
    use crate::ports::{Consumer, DeliveryQueue, QueueSpec, SystemClock};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    const Q: &str = "tasks";

    async fn setup(declare: bool) -> (Submitter, Arc<InMemoryTaskStore>, Arc<InMemoryDeliveryQueue>) {
        let store = Arc::new(InMemoryTaskStore::new(Arc::new(SystemClock)));
        let queue = Arc::new(InMemoryDeliveryQueue::new());
        if declare {
            queue
                .declare_queue(&QueueSpec {
                    name: Q.into(),
                    durable: true,
                    max_priority: Some(10),
                })
                .await
                .unwrap();
        }
        let submitter = Submitter::new(store.clone(), EntryPublisher::new(queue.clone(), Q));
        (submitter, store, queue)
    }

    #[tokio::test]
    async fn test_create_task_stores_and_publishes_once() {
        let (submitter, store, queue) = setup(true).await;
        let new = NewTask::new(
            Priority::new(1).unwrap(),
            json!({"action": "send_email", "recipient": "a@example.com"}),
        );
        let id = submitter.create_task(new).await.unwrap();

        let task = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(queue.ready_len(Q), 1);
        assert_eq!(queue.persistent_len(Q), 1);

        let mut consumer = queue.consume(Q, 1).await.unwrap();
        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.priority.value(), 1);
        assert_eq!(QueueEntry::decode(&delivery.body).unwrap().id, id);
    }

    #[tokio::test]
    async fn test_non_object_payload_is_rejected() {
        let (submitter, store, queue) = setup(true).await;
        let err = submitter
            .create_task(NewTask::new(Priority::default(), json!("send_email")))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::InvalidPayload));
        assert!(store.is_empty().await);
        assert_eq!(queue.ready_len(Q), 0);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_pending_record() {
        let (submitter, store, _) = setup(false).await;
        let err = submitter
            .create_task(NewTask::new(Priority::default(), json!({"action": "fetch_data"})))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Queue(_)));
        assert_eq!(store.len().await, 1);
    }

    #[derive(Serialize, Deserialize)]
    struct Notify {
        recipient: String,
    }

    impl Action for Notify {
        const NAME: &'static str = "notify";
    }

    #[tokio::test]
    async fn test_submit_typed_action() {
        let (submitter, store, _) = setup(true).await;
        let id = submitter
            .submit(
                Priority::new(4).unwrap(),
                &Notify {
                    recipient: "ops@example.com".into(),
                },
                None,
            )
            .await
            .unwrap();
        let task = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.action(), Some("notify"));
        assert_eq!(task.payload["recipient"], "ops@example.com");
    }
}
