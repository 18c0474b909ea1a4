//! TaskStore port - task の正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - task の identity / priority / payload / scheduled_at
//! - 状態（TaskStatus）
//!
//! # 実装
//! - **InMemoryTaskStore**（`impls::inmem_store`）: 開発・テスト用

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ErrorKind, NewTask, Task, TaskId, TaskStatus};

/// TaskStore の操作エラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id}: transition {from} -> {to} is not allowed")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("task store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) | StoreError::InvalidTransition { .. } => ErrorKind::Permanent,
            StoreError::Unavailable(_) => ErrorKind::Infrastructure,
        }
    }
}

/// 状態ごとの件数（ステータス表示用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub rescheduled: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Rescheduled => self.rescheduled += 1,
            TaskStatus::Completed => self.completed += 1,
            TaskStatus::Failed => self.failed += 1,
        }
    }

    /// COMPLETED / FAILED 以外の件数
    pub fn open(&self) -> usize {
        self.pending + self.rescheduled
    }
}

/// TaskStore は task 状態の正本
///
/// # 設計原則
/// - キューのエントリはポインタに過ぎず、判断は常にここを読んで行う
/// - 終端状態（COMPLETED / FAILED）からの遷移は拒否する
/// - 楽観的排他は持たない（単一 consumer 前提）
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// 新しい task を PENDING で作成し、採番済みの record を返す
    async fn create(&self, new: NewTask) -> Result<Task, StoreError>;

    async fn find_by_id(&self, id: TaskId) -> Result<Option<Task>, StoreError>;

    /// 状態を更新する。`scheduled_at` が `Some` のときだけ予定時刻も上書きする
    async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> Result<Task, StoreError>;

    /// 終端でなく、予定時刻（なければ作成時刻）が `before` より前の task
    ///
    /// キューから消えた可能性のある task を見つけるための問い合わせです。
    async fn find_stranded(&self, before: DateTime<Utc>) -> Result<Vec<Task>, StoreError>;

    async fn counts_by_status(&self) -> Result<StatusCounts, StoreError>;
}
