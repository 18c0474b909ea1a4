//! QueueEntry - キューに流す“運搬用”データ
//!
//! エントリは task の id（と publish 時点の priority）だけを持つポインタです。
//! payload は持たず、実行時に必ず TaskStore から取り直します。

use serde::{Deserialize, Serialize};

use super::{Priority, TaskId};

/// Queue Entry の本体
///
/// # ワイヤ形式
/// `{"id":"01HV...","priority":5}`。デコード時に必須なのは `id` のみで、
/// `priority` が無ければ 0 として扱います。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: TaskId,
    #[serde(default)]
    pub priority: Priority,
}

/// エントリの変換失敗
#[derive(Debug, thiserror::Error)]
pub enum EntryCodecError {
    #[error("queue entry could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("malformed queue entry: {0}")]
    Decode(#[source] serde_json::Error),
}

impl QueueEntry {
    pub fn new(id: TaskId, priority: Priority) -> Self {
        Self { id, priority }
    }

    /// トランスポートの byte payload へ変換
    pub fn encode(&self) -> Result<Vec<u8>, EntryCodecError> {
        serde_json::to_vec(self).map_err(EntryCodecError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EntryCodecError> {
        serde_json::from_slice(bytes).map_err(EntryCodecError::Decode)
    }
}
