//! InMemoryTaskStore - 開発・テスト用の正本
//!
//! # 実装詳細
//! - HashMap<TaskId, Task> を tokio の Mutex で保護
//! - ID 採番と時刻は注入された IdGenerator / Clock を使う
//! - ロックを跨いだ await はしない

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::{NewTask, Task, TaskId, TaskStatus};
use crate::ports::{Clock, IdGenerator, StatusCounts, StoreError, TaskStore, UlidGenerator};

pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let ids = Arc::new(UlidGenerator::new(Arc::clone(&clock)));
        Self::with_id_generator(clock, ids)
    }

    pub fn with_id_generator(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            ids,
            clock,
        }
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Remove a record (simulates a cancelled or lost task).
    pub async fn remove(&self, id: TaskId) -> Option<Task> {
        self.tasks.lock().await.remove(&id)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, new: NewTask) -> Result<Task, StoreError> {
        let task = Task::create(self.ids.generate_task_id(), new, self.clock.now());
        debug!(task_id = %task.id, priority = %task.priority, "task record created");
        self.tasks.lock().await.insert(task.id, task.clone());
        Ok(task)
    }

    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError> {
        Ok(self.tasks.lock().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Task, StoreError> {
        let now = self.clock.now();
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        if !task.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id,
                from: task.status,
                to: status,
            });
        }

        task.status = status;
        if let Some(at) = scheduled_at {
            task.scheduled_at = Some(at);
        }
        task.updated_at = now;
        Ok(task.clone())
    }

    async fn find_stranded(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.lock().await;
        let mut stranded: Vec<Task> = tasks
            .values()
            .filter(|t| !t.status.is_terminal() && t.due_at() < before)
            .cloned()
            .collect();
        stranded.sort_by_key(|t| t.due_at());
        Ok(stranded)
    }

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError> {
        let tasks = self.tasks.lock().await;
        let mut counts = StatusCounts::default();
        for task in tasks.values() {
            counts.record(task.status);
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Priority;
    use crate::ports::FixedClock;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn store() -> (InMemoryTaskStore, FixedClock) {
        let clock = FixedClock::new(start());
        (InMemoryTaskStore::new(Arc::new(clock.clone())), clock)
    }

    fn new_task(scheduled_at: Option<DateTime<Utc>>) -> NewTask {
        NewTask {
            priority: Priority::new(2).unwrap(),
            payload: serde_json::json!({"action": "process_image", "imageUrl": "x.png"}),
            scheduled_at,
        }
    }

    #[tokio::test]
    async fn create_then_find() {
        let (store, _) = store();
        let created = store.create(new_task(None)).await.unwrap();

        let found = store.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.status, TaskStatus::Pending);
        assert_eq!(found.created_at, start());
    }

    #[tokio::test]
    async fn find_unknown_is_none() {
        let (store, _) = store();
        let id = UlidGenerator::new(FixedClock::new(start())).generate_task_id();
        assert!(store.find_by_id(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_sets_status_schedule_and_timestamp() {
        let (store, clock) = store();
        let created = store.create(new_task(None)).await.unwrap();

        clock.advance(std::time::Duration::from_secs(5));
        let later = start() + Duration::seconds(65);
        let updated = store
            .update_status(created.id, TaskStatus::Rescheduled, Some(later))
            .await
            .unwrap();

        assert_eq!(updated.status, TaskStatus::Rescheduled);
        assert_eq!(updated.scheduled_at, Some(later));
        assert_eq!(updated.updated_at, start() + Duration::seconds(5));

        // None leaves the schedule alone
        let done = store
            .update_status(created.id, TaskStatus::Completed, None)
            .await
            .unwrap();
        assert_eq!(done.scheduled_at, Some(later));
    }

    #[tokio::test]
    async fn terminal_tasks_reject_updates() {
        let (store, _) = store();
        let created = store.create(new_task(None)).await.unwrap();
        store
            .update_status(created.id, TaskStatus::Completed, None)
            .await
            .unwrap();

        let err = store
            .update_status(created.id, TaskStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: TaskStatus::Completed,
                to: TaskStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn update_unknown_is_not_found() {
        let (store, _) = store();
        let created = store.create(new_task(None)).await.unwrap();
        store.remove(created.id).await;
        let err = store
            .update_status(created.id, TaskStatus::Completed, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == created.id));
    }

    #[tokio::test]
    async fn stranded_excludes_terminal_and_future_tasks() {
        let (store, _) = store();
        let overdue = store
            .create(new_task(Some(start() - Duration::minutes(10))))
            .await
            .unwrap();
        let fresh = store.create(new_task(None)).await.unwrap();
        let future = store
            .create(new_task(Some(start() + Duration::hours(1))))
            .await
            .unwrap();
        let done = store.create(new_task(None)).await.unwrap();
        store
            .update_status(done.id, TaskStatus::Completed, None)
            .await
            .unwrap();

        let stranded = store
            .find_stranded(start() + Duration::minutes(1))
            .await
            .unwrap();
        let ids: Vec<TaskId> = stranded.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![overdue.id, fresh.id]);
        assert!(!ids.contains(&future.id));
    }

    #[tokio::test]
    async fn counts_by_status() {
        let (store, _) = store();
        let a = store.create(new_task(None)).await.unwrap();
        let b = store.create(new_task(None)).await.unwrap();
        store.create(new_task(None)).await.unwrap();
        store
            .update_status(a.id, TaskStatus::Completed, None)
            .await
            .unwrap();
        store
            .update_status(b.id, TaskStatus::Rescheduled, None)
            .await
            .unwrap();

        let counts = store.counts_by_status().await.unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.rescheduled, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.open(), 2);
    }
}
