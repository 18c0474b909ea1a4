//! DispatchStrategy port - payload から action 名へのマッピング
//!
//! # デフォルト
//! - PayloadActionDispatch: payload の `action` フィールドをそのまま使う
//!
//! priority はここでは使いません（priority はトランスポート専用）。

/// DispatchStrategy は task の payload から handler を引くためのキーを決める
///
/// キーが取れなければ `None`（Unhandled 扱い）。
pub trait DispatchStrategy: Send + Sync {
    fn select_action(&self, payload: &serde_json::Value) -> Option<String>;
}
