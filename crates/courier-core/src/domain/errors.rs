//! Errors - エラーの運用分類
//!
//! エラー型そのものは `crate::error::CourierError` にあります。
//! ここでは「どう扱うべきか」の分類だけを定義します。

use serde::{Deserialize, Serialize};

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（配送は ack せず、再配送に任せる）
/// - Permanent: 恒久的なエラー（リトライしても無意味）
/// - Infrastructure: インフラエラー（TaskStore / トランスポートの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

impl ErrorKind {
    /// 再配送で回復が見込めるか
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}
