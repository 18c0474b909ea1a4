//! AppHandle - 起動したバックグラウンドタスク（worker / reaper）の操作
//!
//! - `request_shutdown()` で全タスクに停止を知らせる
//! - `shutdown_and_join()` で停止を待つ（実行中の handler は最後まで走る）

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::error::CourierError;

pub struct AppHandle {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<(&'static str, JoinHandle<Result<(), CourierError>>)>,
}

impl AppHandle {
    pub(crate) fn new(shutdown_tx: watch::Sender<bool>) -> Self {
        Self {
            shutdown_tx,
            joins: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: &'static str, join: JoinHandle<Result<(), CourierError>>) {
        self.joins.push((name, join));
    }

    /// 起動中のタスク名
    pub fn tasks(&self) -> Vec<&'static str> {
        self.joins.iter().map(|(name, _)| *name).collect()
    }

    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// 停止を要求して全タスクの終了を待つ。最初に失敗したタスクのエラーを返す
    pub async fn shutdown_and_join(self) -> Result<(), CourierError> {
        self.request_shutdown();
        let mut first_error = None;
        for (name, join) in self.joins {
            match join.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(task = name, error = %e, "background task failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => error!(task = name, error = %e, "background task panicked"),
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
