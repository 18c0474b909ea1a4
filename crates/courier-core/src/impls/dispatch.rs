//! PayloadActionDispatch - payload の判別フィールドで handler を引く
//!
//! デフォルトの DispatchStrategy 実装です。`{"action": "send_email", ...}` なら
//! `send_email` を返します。

use serde_json::Value;

use crate::ports::DispatchStrategy;

pub struct PayloadActionDispatch {
    field: String,
}

impl PayloadActionDispatch {
    pub const DEFAULT_FIELD: &'static str = "action";

    pub fn new() -> Self {
        Self::with_field(Self::DEFAULT_FIELD)
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
        }
    }
}

impl DispatchStrategy for PayloadActionDispatch {
    fn select_action(&self, payload: &Value) -> Option<String> {
        payload
            .get(&self.field)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
    }
}

impl Default for PayloadActionDispatch {
    fn default() -> Self {
        Self::new()
    }
}
