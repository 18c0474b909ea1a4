//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: アプリケーションの構築とワイヤリング
//! - **Runtime**: payload の判別子で handler を引いて実行
//! - **Submitter**: task の投入（store に作成 → entry を publish）
//! - **WorkerLoop**: 配送ループ（decode→lookup→assess→execute→update→ack）
//! - **Rescheduler**: 「いまは無理」な task を backoff 後へ回す
//! - **ReaperLoop**: 取り残された task の再 publish
//! - **StatusReport**: 件数・処理中・取り残しのスナップショット

pub mod builder;
pub mod handle;
pub mod publisher;
pub mod reaper_loop;
pub mod reschedule;
pub mod runtime;
pub mod status;
pub mod submission;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{App, AppBuilder};
pub use self::handle::AppHandle;
pub use self::publisher::EntryPublisher;
pub use self::reaper_loop::ReaperLoop;
pub use self::reschedule::Rescheduler;
pub use self::runtime::Runtime;
pub use self::status::StatusReport;
pub use self::submission::Submitter;
pub use self::worker_loop::{Disposition, WorkerLoop, WorkerSettings};
