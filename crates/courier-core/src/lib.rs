//! courier-core
//!
//! Core building blocks for the Courier task runtime.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, priority, task, envelope, outcome, decision, state, errors）
//! - **ports**: 抽象化レイヤー（TaskStore, DeliveryQueue, RateGate, DispatchStrategy, Clock, IdGenerator）
//! - **impls**: ports のプロセス内実装（InMemoryTaskStore, InMemoryDeliveryQueue, WindowRateGate, など）
//! - **typed**: 型付き Action API（Action trait, Handler trait, TypedRegistry, PayloadCodec）
//! - **app**: アプリケーションロジック（builder, runtime, submission, worker_loop, reschedule, reaper_loop, status）
//! - **actions**: 組み込みの action handler（fetch_data, send_email, process_image）
//! - **config**: 設定の型と読み込み
//! - **error**: エラー型

pub mod actions;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod typed;

pub use self::app::{App, AppBuilder, AppHandle, StatusReport, Submitter};
pub use self::config::CourierConfig;
pub use self::error::CourierError;
