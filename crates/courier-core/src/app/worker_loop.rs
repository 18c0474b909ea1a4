//! WorkerLoop - 配送を 1 件ずつ処理する consumer ループ
//!
//! # フロー（1 配送あたり）
//! 1. entry を decode（壊れていれば requeue せずに捨てる）
//! 2. TaskStore から task を読む
//! 3. 無ければ ack して捨てる
//! 4. 終端状態なら ack して捨てる（重複配送）
//! 5. 期日前なら実行せず、期日まで遅延 requeue
//! 6. 実行して Outcome を store に反映し、最後に ack
//! 7. 2-6 で想定外のエラーが出たら ack しない（再配送に任せる）
//!
//! # 実装詳細
//! - prefetch の範囲でしか配送は来ないので、1 件ずつ最後まで処理する
//! - 処理中の task id は watch channel で公開する（ReaperLoop / status 用）
//! - shutdown は配送と配送の間でだけ見る（実行中の handler は止めない）

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::reschedule::Rescheduler;
use super::runtime::Runtime;
use crate::domain::{
    QueueEntry, Readiness, Resolution, Task, TaskId, TaskStatus, UnknownActionPolicy, assess,
    resolve,
};
use crate::error::CourierError;
use crate::ports::{
    Clock, Consumer, Delivery, DeliveryQueue, QueueError, QueueSpec, Requeue, StoreError,
    TaskStore,
};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// 1 配送の処理結果
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// entry が decode できず捨てた
    Poison,
    /// 正本に task が無く、ack して捨てた
    Missing(TaskId),
    /// 既に終端状態。handler は呼ばずに ack した
    Duplicate(TaskId, TaskStatus),
    /// 期日前なので `wait` 後に戻した
    Deferred(TaskId, Duration),
    Completed(TaskId),
    Rescheduled(TaskId, DateTime<Utc>),
    Failed(TaskId, String),
    /// 想定外のエラーで ack していない
    Unacked,
}

pub struct WorkerSettings {
    /// 再接続時にもこの宣言で declare し直す
    pub queue: QueueSpec,
    pub prefetch: u16,
    pub max_defer: Duration,
    pub unknown_action: UnknownActionPolicy,
}

pub struct WorkerLoop {
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn DeliveryQueue>,
    runtime: Arc<Runtime>,
    rescheduler: Arc<Rescheduler>,
    clock: Arc<dyn Clock>,
    settings: WorkerSettings,
    in_flight: watch::Sender<Option<TaskId>>,
}

impl WorkerLoop {
    pub fn new(
        store: Arc<dyn TaskStore>,
        queue: Arc<dyn DeliveryQueue>,
        runtime: Arc<Runtime>,
        rescheduler: Arc<Rescheduler>,
        clock: Arc<dyn Clock>,
        settings: WorkerSettings,
    ) -> Self {
        let (in_flight, _) = watch::channel(None);
        Self {
            store,
            queue,
            runtime,
            rescheduler,
            clock,
            settings,
            in_flight,
        }
    }

    /// 処理中の task id を購読する
    pub fn in_flight(&self) -> watch::Receiver<Option<TaskId>> {
        self.in_flight.subscribe()
    }

    pub async fn open_consumer(&self) -> Result<Box<dyn Consumer>, QueueError> {
        self.queue
            .consume(&self.settings.queue.name, self.settings.prefetch)
            .await
    }

    /// shutdown が立つか、consumer が閉じるまで配送を処理し続ける
    ///
    /// consumer がエラーを返したら、キューを宣言し直して consumer を開き直す
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CourierError> {
        let mut consumer = self.open_consumer().await?;
        info!(queue = %self.settings.queue.name, prefetch = self.settings.prefetch, "worker started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            // next() は待つ可能性があるので select で shutdown と競合させる
            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                next = consumer.next() => next,
            };

            match next {
                Ok(Some(delivery)) => {
                    self.handle(&delivery).await;
                }
                Ok(None) => {
                    warn!(queue = %self.settings.queue.name, "consumer closed");
                    break;
                }
                Err(e) => {
                    error!(queue = %self.settings.queue.name, kind = ?e.kind(), error = %e, "consumer failed, reconnecting");
                    match self.reconnect(&mut shutdown).await {
                        Some(reopened) => consumer = reopened,
                        None => break,
                    }
                }
            }
        }

        info!(queue = %self.settings.queue.name, "worker stopped");
        Ok(())
    }

    /// 成功するか shutdown されるまで再宣言と再接続を繰り返す。shutdown なら `None`
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Box<dyn Consumer>> {
        let mut delay = RECONNECT_DELAY;
        loop {
            if *shutdown.borrow() {
                return None;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    match self.reopen().await {
                        Ok(consumer) => {
                            info!(queue = %self.settings.queue.name, "consumer reopened");
                            return Some(consumer);
                        }
                        Err(e) => {
                            delay = (delay * 2).min(MAX_RECONNECT_DELAY);
                            warn!(queue = %self.settings.queue.name, error = %e, retry_ms = delay.as_millis() as u64, "reconnect failed");
                        }
                    }
                }
            }
        }
    }

    async fn reopen(&self) -> Result<Box<dyn Consumer>, QueueError> {
        self.queue.declare_queue(&self.settings.queue).await?;
        self.open_consumer().await
    }

    /// 次の配送を 1 件待って処理する。consumer が閉じていれば `None`
    pub async fn process_one(
        &self,
        consumer: &mut dyn Consumer,
    ) -> Result<Option<Disposition>, QueueError> {
        let Some(delivery) = consumer.next().await? else {
            return Ok(None);
        };
        Ok(Some(self.handle(&delivery).await))
    }

    /// 1 配送を処理する。エラーはここでログに落とし、配送は ack しない
    pub async fn handle(&self, delivery: &Delivery) -> Disposition {
        match self.handle_delivery(delivery).await {
            Ok(disposition) => disposition,
            Err(e) => {
                error!(
                    tag = %delivery.tag,
                    redelivered = delivery.redelivered,
                    kind = ?e.kind(),
                    error = %e,
                    "delivery left unacknowledged"
                );
                Disposition::Unacked
            }
        }
    }

    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<Disposition, CourierError> {
        let entry = match QueueEntry::decode(&delivery.body) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(tag = %delivery.tag, error = %e, "discarding undecodable entry");
                self.queue.nack(delivery, Requeue::Discard).await?;
                return Ok(Disposition::Poison);
            }
        };

        let id = entry.id;
        let task = self.store.find_by_id(id).await?;
        match assess(task.as_ref(), self.clock.now(), self.settings.max_defer) {
            Readiness::Missing => {
                warn!(task_id = %id, "entry points at a task that does not exist");
                self.queue.ack(delivery).await?;
                Ok(Disposition::Missing(id))
            }
            Readiness::Terminal(status) => {
                debug!(task_id = %id, %status, "duplicate delivery of a finished task");
                self.queue.ack(delivery).await?;
                Ok(Disposition::Duplicate(id, status))
            }
            Readiness::NotDue { until, wait } => {
                debug!(task_id = %id, %until, wait_ms = wait.as_millis() as u64, "task not due yet, deferring");
                self.queue.nack(delivery, Requeue::After(wait)).await?;
                Ok(Disposition::Deferred(id, wait))
            }
            Readiness::Ready => {
                let task = task.ok_or(StoreError::NotFound(id))?;
                self.in_flight.send_replace(Some(id));
                let result = self.execute(&task).await;
                self.in_flight.send_replace(None);

                let disposition = result?;
                self.queue.ack(delivery).await?;
                Ok(disposition)
            }
        }
    }

    async fn execute(&self, task: &Task) -> Result<Disposition, CourierError> {
        let started = tokio::time::Instant::now();
        let outcome = self.runtime.execute(task).await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match resolve(&outcome, self.settings.unknown_action) {
            Resolution::Complete => {
                self.store
                    .update_status(task.id, TaskStatus::Completed, None)
                    .await?;
                info!(task_id = %task.id, priority = %task.priority, outcome = outcome.label(), elapsed_ms, "task completed");
                Ok(Disposition::Completed(task.id))
            }
            Resolution::Reschedule { reason } => {
                let updated = self.rescheduler.reschedule(task).await?;
                info!(task_id = %task.id, %reason, elapsed_ms, "task deferred by handler");
                Ok(Disposition::Rescheduled(task.id, updated.due_at()))
            }
            Resolution::Fail { reason } => {
                self.store
                    .update_status(task.id, TaskStatus::Failed, None)
                    .await?;
                warn!(task_id = %task.id, outcome = outcome.label(), %reason, elapsed_ms, "task failed");
                Ok(Disposition::Failed(task.id, reason))
            }
        }
    }
}
