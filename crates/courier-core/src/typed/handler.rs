//! Handler trait - Action を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<A>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<A, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::warn;

use super::action::Action;
use super::codec::PayloadCodec;
use crate::domain::{Outcome, Task};

/// HandlerError は handler の想定外の失敗
///
/// 「いまは無理」「二度と無理」は Outcome で返します。ここに来るのは
/// 外部依存の障害など、配送を ack せずに再配送へ回すべきものだけです。
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Handler は Action を実行して Outcome を返す
///
/// # 使用例
/// ```ignore
/// struct SendEmailHandler;
///
/// #[async_trait]
/// impl Handler<SendEmail> for SendEmailHandler {
///     async fn handle(&self, action: SendEmail, task: &Task) -> Result<Outcome, HandlerError> {
///         mailer.send(&action.to).await?;
///         Ok(Outcome::completed())
///     }
/// }
/// ```
///
/// # ジェネリクスによる型安全性
/// - `Handler<SendEmail>` は `SendEmail` しか受け取れない
/// - 判別子と型の対応はコンパイル時に決まる
#[async_trait]
pub trait Handler<A: Action>: Send + Sync {
    async fn handle(&self, action: A, task: &Task) -> Result<Outcome, HandlerError>;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<A, H> を DynHandler に変換することで、
/// HashMap<String, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, task: &Task) -> Result<Outcome, HandlerError>;
    fn action_name(&self) -> &'static str;
}

pub struct TypedHandler<A: Action, H: Handler<A>> {
    handler: H,
    _marker: PhantomData<fn() -> A>,
}

impl<A: Action, H: Handler<A>> TypedHandler<A, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<A: Action, H: Handler<A>> DynHandler for TypedHandler<A, H> {
    async fn handle_dyn(&self, task: &Task) -> Result<Outcome, HandlerError> {
        // 壊れた payload は何度配送しても直らない
        let action: A = match PayloadCodec::decode(&task.payload) {
            Ok(action) => action,
            Err(e) => {
                warn!(task_id = %task.id, action = A::NAME, error = %e, "payload rejected");
                return Ok(Outcome::failed(e.to_string()));
            }
        };
        self.handler.handle(action, task).await
    }

    fn action_name(&self) -> &'static str {
        A::NAME
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{NewTask, Priority, TaskId};
    use chrono::Utc;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use ulid::Ulid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Echo {
        pub value: i32,
    }

    impl Action for Echo {
        const NAME: &'static str = "echo";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Shout {
        pub text: String,
    }

    impl Action for Shout {
        const NAME: &'static str = "shout";
    }

    /// value が負なら Reschedule、0 なら Err
    pub struct EchoHandler;

    #[async_trait]
    impl Handler<Echo> for EchoHandler {
        async fn handle(&self, action: Echo, _task: &Task) -> Result<Outcome, HandlerError> {
            match action.value {
                0 => Err(HandlerError::new("echo backend down")),
                v if v < 0 => Ok(Outcome::reschedule("negative echo")),
                _ => Ok(Outcome::completed()),
            }
        }
    }

    pub struct ShoutHandler;

    #[async_trait]
    impl Handler<Shout> for ShoutHandler {
        async fn handle(&self, _action: Shout, _task: &Task) -> Result<Outcome, HandlerError> {
            Ok(Outcome::completed())
        }
    }

    pub fn task_with(payload: serde_json::Value) -> Task {
        Task::create(
            TaskId::from_ulid(Ulid::new()),
            NewTask::new(Priority::new(1).unwrap(), payload),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_typed_handler_decodes_and_runs() {
        let handler = TypedHandler::<Echo, _>::new(EchoHandler);
        let outcome = handler
            .handle_dyn(&task_with(json!({"action": "echo", "value": 100})))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(handler.action_name(), "echo");
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_failed_outcome() {
        let handler = TypedHandler::<Echo, _>::new(EchoHandler);
        let outcome = handler
            .handle_dyn(&task_with(json!({"action": "echo", "value": "nope"})))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_handler_error_is_propagated() {
        let handler = TypedHandler::<Echo, _>::new(EchoHandler);
        let err = handler
            .handle_dyn(&task_with(json!({"action": "echo", "value": 0})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "echo backend down");
    }
}
