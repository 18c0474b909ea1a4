//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（task の永続化、メッセージブローカーなど）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - DeliveryQueue は配送キュー（task id のみ）
//! - 時刻・ID 採番・レート制限も注入できるようにする

pub mod clock;
pub mod delivery_queue;
pub mod dispatch;
pub mod id_generator;
pub mod rate_gate;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock, TokioClock};
pub use self::delivery_queue::{
    Consumer, Delivery, DeliveryQueue, DeliveryTag, PublishOptions, QueueError, QueueSpec, Requeue,
};
pub use self::dispatch::DispatchStrategy;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::rate_gate::RateGate;
pub use self::task_store::{StatusCounts, StoreError, TaskStore};
