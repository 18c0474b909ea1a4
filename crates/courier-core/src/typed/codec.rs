//! PayloadCodec - payload (JSON) と Action の相互変換
//!
//! payload は `{"action": "<NAME>", ...fields}` の形です。判別子は codec が
//! 付け外しするので、Action の構造体は `action` フィールドを持ちません。

use serde_json::{Map, Value};

use super::action::Action;
use crate::impls::PayloadActionDispatch;

/// CodecError は payload 変換のエラー
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("payload for {action} does not decode: {source}")]
    Decode {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("action {action} does not encode: {source}")]
    Encode {
        action: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("action {0} must encode to a JSON object")]
    NotAnObject(&'static str),
}

pub struct PayloadCodec;

impl PayloadCodec {
    /// payload を A にデシリアライズ（判別子以外の未知フィールドは無視）
    pub fn decode<A: Action>(payload: &Value) -> Result<A, CodecError> {
        A::deserialize(payload).map_err(|source| CodecError::Decode {
            action: A::NAME,
            source,
        })
    }

    /// A を判別子つきの payload にシリアライズ
    pub fn encode<A: Action>(action: &A) -> Result<Value, CodecError> {
        let value = serde_json::to_value(action).map_err(|source| CodecError::Encode {
            action: A::NAME,
            source,
        })?;
        let mut fields = match value {
            Value::Object(fields) => fields,
            Value::Null => Map::new(),
            _ => return Err(CodecError::NotAnObject(A::NAME)),
        };
        fields.insert(
            PayloadActionDispatch::DEFAULT_FIELD.to_string(),
            Value::String(A::NAME.to_string()),
        );
        Ok(Value::Object(fields))
    }
}
