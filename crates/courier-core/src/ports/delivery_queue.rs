//! DeliveryQueue port - 配送キュー（メッセージブローカーの抽象）
//!
//! DeliveryQueue は Queue Entry の bytes だけを流します（状態や payload は含まない）。
//!
//! # 実装
//! - **InMemoryDeliveryQueue**（`impls::inmem_delivery`）: 開発・テスト用

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{EntryCodecError, ErrorKind, Priority};

/// DeliveryQueue の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue {0:?} is not declared")]
    QueueNotFound(String),

    #[error("queue {name:?} already declared with different arguments")]
    PreconditionFailed { name: String },

    #[error("unknown delivery tag {0}")]
    UnknownDelivery(DeliveryTag),

    #[error("queue operation failed: {0}")]
    OperationFailed(String),

    #[error(transparent)]
    Entry(#[from] EntryCodecError),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::OperationFailed(_) => ErrorKind::Infrastructure,
            QueueError::UnknownDelivery(_) => ErrorKind::Transient,
            QueueError::QueueNotFound(_)
            | QueueError::PreconditionFailed { .. }
            | QueueError::Entry(_) => ErrorKind::Permanent,
        }
    }
}

/// キュー宣言の引数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSpec {
    pub name: String,
    pub durable: bool,
    /// priority の上限（None なら priority を無視して FIFO）
    pub max_priority: Option<u8>,
}

/// publish 時のオプション
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub priority: Priority,
    pub persistent: bool,
    /// 指定するとその時間が経つまで配送されない
    pub delay: Option<Duration>,
}

impl PublishOptions {
    pub fn persistent(priority: Priority) -> Self {
        Self {
            priority,
            persistent: true,
            delay: None,
        }
    }

    pub fn delayed_by(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// 配送ごとに振られる番号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// consumer に届いた 1 件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub queue: String,
    pub body: Vec<u8>,
    pub priority: Priority,
    /// 一度配送されて戻ってきたものか
    pub redelivered: bool,
}

/// nack 時の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requeue {
    /// 捨てる（poison entry）
    Discard,
    /// すぐにキューへ戻す
    Immediate,
    /// 指定時間後にキューへ戻す
    After(Duration),
}

/// `consume` が返す購読ハンドル
#[async_trait]
pub trait Consumer: Send {
    /// 次の配送を待つ。キューが消えたら `Ok(None)`
    ///
    /// prefetch 件数ぶん未 ack の配送を抱えている間は待ち続けます。
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError>;
}

/// DeliveryQueue はブローカーへのインターフェース
///
/// # 設計原則
/// - プロセス起動時に 1 つ作り、submission / consumer / reschedule で共有する
/// - priority が高いものから配送、同じ priority なら FIFO
/// - ack されない配送はトランスポート側の都合で再配送される
#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    /// 冪等。引数が食い違えば `PreconditionFailed`
    async fn declare_queue(&self, spec: &QueueSpec) -> Result<(), QueueError>;

    async fn publish(
        &self,
        queue: &str,
        body: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), QueueError>;

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<Box<dyn Consumer>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    async fn nack(&self, delivery: &Delivery, requeue: Requeue) -> Result<(), QueueError>;
}
