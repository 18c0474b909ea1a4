//! Impls - ports のプロセス内実装
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: 開発・テスト用の正本
//! - **InMemoryDeliveryQueue**: priority / delay / 再配送つきの配送キュー
//! - **PayloadActionDispatch**: デフォルトの DispatchStrategy
//! - **WindowRateGate**: デフォルトの RateGate
//!
//! # 本番用実装
//! ブローカーや DB に繋ぐ実装は ports の trait を実装した別クレートに置きます。

pub mod dispatch;
pub mod inmem_delivery;
pub mod inmem_store;
pub mod rate_gate;

// 主要な型を再エクスポート
pub use self::dispatch::PayloadActionDispatch;
pub use self::inmem_delivery::InMemoryDeliveryQueue;
pub use self::inmem_store::InMemoryTaskStore;
pub use self::rate_gate::WindowRateGate;
