//! InMemoryDeliveryQueue - 開発用の配送キュー
//!
//! ブローカー（priority 付きの durable queue）の振る舞いをプロセス内で再現します。
//!
//! # 実装詳細
//! - キューごとに ready（priority heap）/ delayed（時刻 heap）/ unacked（配送中）を持つ
//! - 状態は Mutex 1 つで保護し、変化があれば Notify で待機中の consumer を起こす
//! - ロック区間に await を入れない（std の Mutex で十分）
//! - 時刻は `tokio::time::Instant` を使う（テストで時間を止められるように）
//!
//! # 再配送
//! ack されないまま `redelivery_timeout` を過ぎた配送は ready に戻り、
//! `redelivered = true` で再び配送されます。consumer を drop した場合も同様に戻ります。

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::Priority;
use crate::ports::{
    Consumer, Delivery, DeliveryQueue, DeliveryTag, PublishOptions, QueueError, QueueSpec, Requeue,
};

#[derive(Debug, Clone)]
struct Message {
    body: Vec<u8>,
    priority: Priority,
    persistent: bool,
    /// publish 順。同じ priority の中で FIFO にするため
    seq: u64,
    redelivered: bool,
}

/// ready heap の要素: priority が高い順、同じなら seq が小さい順
#[derive(Debug)]
struct Ready(Message);

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .priority
            .cmp(&other.0.priority)
            .then_with(|| other.0.seq.cmp(&self.0.seq))
    }
}

/// delayed heap の要素: due が早い順（BinaryHeap を min-heap として使う）
#[derive(Debug)]
struct Delayed {
    due: Instant,
    message: Message,
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.message.seq.cmp(&self.message.seq))
    }
}

#[derive(Debug)]
struct Unacked {
    message: Message,
    consumer: u64,
    delivered_at: Instant,
}

struct QueueState {
    spec: QueueSpec,
    ready: BinaryHeap<Ready>,
    delayed: BinaryHeap<Delayed>,
    unacked: HashMap<DeliveryTag, Unacked>,
}

impl QueueState {
    fn new(spec: QueueSpec) -> Self {
        Self {
            spec,
            ready: BinaryHeap::new(),
            delayed: BinaryHeap::new(),
            unacked: HashMap::new(),
        }
    }

    fn effective_priority(&self, requested: Priority) -> Priority {
        match self.spec.max_priority {
            Some(max) => requested.clamp_to(max),
            None => Priority::default(),
        }
    }

    /// 期限の来た delayed を ready へ移す
    fn promote_delayed(&mut self, now: Instant) {
        while self.delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(entry) = self.delayed.pop() {
                self.ready.push(Ready(entry.message));
            }
        }
    }

    /// ack 期限切れの配送を回収する。回収した配送の consumer を返す
    fn reclaim_expired(&mut self, now: Instant, timeout: Option<Duration>) -> Vec<u64> {
        let Some(timeout) = timeout else {
            return Vec::new();
        };
        let expired: Vec<DeliveryTag> = self
            .unacked
            .iter()
            .filter(|(_, u)| u.delivered_at + timeout <= now)
            .map(|(tag, _)| *tag)
            .collect();

        let mut owners = Vec::with_capacity(expired.len());
        for tag in expired {
            if let Some(mut u) = self.unacked.remove(&tag) {
                warn!(queue = %self.spec.name, %tag, "delivery not acknowledged in time, requeueing");
                u.message.redelivered = true;
                owners.push(u.consumer);
                self.ready.push(Ready(u.message));
            }
        }
        owners
    }

    /// 次に状態が変わりうる時刻
    fn next_wake(&self, timeout: Option<Duration>) -> Option<Instant> {
        let delayed = self.delayed.peek().map(|d| d.due);
        let expiry = timeout.and_then(|t| {
            self.unacked
                .values()
                .map(|u| u.delivered_at + t)
                .min()
        });
        match (delayed, expiry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

struct ConsumerState {
    queue: String,
    prefetch: u16,
    in_flight: usize,
}

impl ConsumerState {
    fn has_capacity(&self) -> bool {
        self.prefetch == 0 || self.in_flight < usize::from(self.prefetch)
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, QueueState>,
    consumers: HashMap<u64, ConsumerState>,
    next_tag: u64,
    next_seq: u64,
    next_consumer: u64,
}

impl State {
    fn release(&mut self, consumer: u64) {
        if let Some(c) = self.consumers.get_mut(&consumer) {
            c.in_flight = c.in_flight.saturating_sub(1);
        }
    }

    fn take_unacked(&mut self, delivery: &Delivery) -> Result<Message, QueueError> {
        let queue = self
            .queues
            .get_mut(&delivery.queue)
            .ok_or_else(|| QueueError::QueueNotFound(delivery.queue.clone()))?;
        let unacked = queue
            .unacked
            .remove(&delivery.tag)
            .ok_or(QueueError::UnknownDelivery(delivery.tag))?;
        self.release(unacked.consumer);
        Ok(unacked.message)
    }
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
    redelivery_timeout: Option<Duration>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// InMemoryDeliveryQueue は開発用の配送キュー
///
/// # 使用例
/// ```ignore
/// let queue = InMemoryDeliveryQueue::new();
/// queue.declare_queue(&spec).await?;
/// queue.publish("tasks", entry.encode()?, PublishOptions::persistent(priority)).await?;
/// let mut consumer = queue.consume("tasks", 1).await?;
/// let delivery = consumer.next().await?;
/// ```
#[derive(Clone)]
pub struct InMemoryDeliveryQueue {
    shared: Arc<Shared>,
}

impl InMemoryDeliveryQueue {
    /// 再配送タイムアウトのデフォルト
    pub const DEFAULT_REDELIVERY_TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new() -> Self {
        Self::with_redelivery_timeout(Some(Self::DEFAULT_REDELIVERY_TIMEOUT))
    }

    /// `None` なら ack されない配送は consumer が drop されるまで戻らない
    pub fn with_redelivery_timeout(timeout: Option<Duration>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                redelivery_timeout: timeout,
            }),
        }
    }

    /// 配送待ちの件数
    pub fn ready_len(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.ready.len())
    }

    /// 遅延中（delay 付き publish / 遅延 requeue）の件数
    pub fn delayed_len(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.delayed.len())
    }

    /// 配送済みで ack 待ちの件数
    pub fn unacked_len(&self, queue: &str) -> usize {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map_or(0, |q| q.unacked.len())
    }

    /// 永続指定で publish されたメッセージの件数（ready + delayed + unacked）
    pub fn persistent_len(&self, queue: &str) -> usize {
        self.shared.lock().queues.get(queue).map_or(0, |q| {
            q.ready.iter().filter(|r| r.0.persistent).count()
                + q.delayed.iter().filter(|d| d.message.persistent).count()
                + q.unacked.values().filter(|u| u.message.persistent).count()
        })
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), QueueError> {
        let mut state = self.shared.lock();
        match state.queues.get(&spec.name) {
            Some(existing) if existing.spec != *spec => Err(QueueError::PreconditionFailed {
                name: spec.name.clone(),
            }),
            Some(_) => Ok(()),
            None => {
                debug!(queue = %spec.name, durable = spec.durable, max_priority = ?spec.max_priority, "queue declared");
                state
                    .queues
                    .insert(spec.name.clone(), QueueState::new(spec.clone()));
                Ok(())
            }
        }
    }

    async fn publish(
        &self,
        queue: &str,
        body: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), QueueError> {
        {
            let mut state = self.shared.lock();
            let seq = state.next_seq;
            state.next_seq += 1;

            let q = state
                .queues
                .get_mut(queue)
                .ok_or_else(|| QueueError::QueueNotFound(queue.to_string()))?;
            let message = Message {
                body,
                priority: q.effective_priority(options.priority),
                persistent: options.persistent,
                seq,
                redelivered: false,
            };
            match options.delay.filter(|d| !d.is_zero()) {
                Some(delay) => q.delayed.push(Delayed {
                    due: Instant::now() + delay,
                    message,
                }),
                None => q.ready.push(Ready(message)),
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Consumer>, QueueError> {
        let mut state = self.shared.lock();
        if !state.queues.contains_key(queue) {
            return Err(QueueError::QueueNotFound(queue.to_string()));
        }
        let id = state.next_consumer;
        state.next_consumer += 1;
        state.consumers.insert(
            id,
            ConsumerState {
                queue: queue.to_string(),
                prefetch,
                in_flight: 0,
            },
        );
        Ok(Box::new(InMemoryConsumer {
            id,
            queue: queue.to_string(),
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.shared.lock().take_unacked(delivery)?;
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: Requeue) -> Result<(), QueueError> {
        {
            let mut state = self.shared.lock();
            let mut message = state.take_unacked(delivery)?;
            message.redelivered = true;
            let q = state
                .queues
                .get_mut(&delivery.queue)
                .ok_or_else(|| QueueError::QueueNotFound(delivery.queue.clone()))?;
            match requeue {
                Requeue::Discard => {
                    debug!(queue = %delivery.queue, tag = %delivery.tag, "delivery discarded");
                }
                Requeue::Immediate => q.ready.push(Ready(message)),
                Requeue::After(delay) if delay.is_zero() => q.ready.push(Ready(message)),
                Requeue::After(delay) => q.delayed.push(Delayed {
                    due: Instant::now() + delay,
                    message,
                }),
            }
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

enum Poll {
    Delivered(Delivery),
    Wait(Option<Instant>),
}

struct InMemoryConsumer {
    id: u64,
    queue: String,
    shared: Arc<Shared>,
}

impl InMemoryConsumer {
    fn poll(&self) -> Result<Poll, QueueError> {
        let now = Instant::now();
        let timeout = self.shared.redelivery_timeout;
        let mut guard = self.shared.lock();
        let state = &mut *guard;

        let q = state
            .queues
            .get_mut(&self.queue)
            .ok_or_else(|| QueueError::QueueNotFound(self.queue.clone()))?;
        q.promote_delayed(now);
        for owner in q.reclaim_expired(now, timeout) {
            if let Some(c) = state.consumers.get_mut(&owner) {
                c.in_flight = c.in_flight.saturating_sub(1);
            }
        }

        let consumer = state
            .consumers
            .get_mut(&self.id)
            .ok_or_else(|| QueueError::OperationFailed("consumer cancelled".to_string()))?;
        if consumer.has_capacity()
            && let Some(Ready(message)) = q.ready.pop()
        {
            let tag = DeliveryTag(state.next_tag);
            state.next_tag += 1;
            consumer.in_flight += 1;

            let delivery = Delivery {
                tag,
                queue: self.queue.clone(),
                body: message.body.clone(),
                priority: message.priority,
                redelivered: message.redelivered,
            };
            q.unacked.insert(
                tag,
                Unacked {
                    message,
                    consumer: self.id,
                    delivered_at: now,
                },
            );
            return Ok(Poll::Delivered(delivery));
        }
        Ok(Poll::Wait(q.next_wake(timeout)))
    }
}

#[async_trait]
impl Consumer for InMemoryConsumer {
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError> {
        loop {
            // 状態を見る前に登録しておけば notify を取りこぼさない
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake = match self.poll()? {
                Poll::Delivered(delivery) => return Ok(Some(delivery)),
                Poll::Wait(wake) => wake,
            };

            match wake {
                Some(at) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(at) => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Drop for InMemoryConsumer {
    /// チャネルを閉じたときと同じく、未 ack の配送をキューへ戻す
    fn drop(&mut self) {
        {
            let mut guard = self.shared.lock();
            let state = &mut *guard;
            state.consumers.remove(&self.id);
            if let Some(q) = state.queues.get_mut(&self.queue) {
                let owned: Vec<DeliveryTag> = q
                    .unacked
                    .iter()
                    .filter(|(_, u)| u.consumer == self.id)
                    .map(|(tag, _)| *tag)
                    .collect();
                for tag in owned {
                    if let Some(mut u) = q.unacked.remove(&tag) {
                        u.message.redelivered = true;
                        q.ready.push(Ready(u.message));
                    }
                }
            }
        }
        self.shared.notify.notify_waiters();
    }
}
