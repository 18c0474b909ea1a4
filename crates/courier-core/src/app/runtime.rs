//! Runtime - payload の判別子から handler を引いて 1 回実行する
//!
//! # フロー
//! 1. DispatchStrategy で action 名を取り出す（取れなければ Unhandled）
//! 2. TypedRegistry から handler を引く（未登録なら Unhandled）
//! 3. 実行期限つきで handler を呼ぶ（期限切れは Reschedule）

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::{Outcome, Task};
use crate::error::CourierError;
use crate::ports::DispatchStrategy;
use crate::typed::TypedRegistry;

pub struct Runtime {
    registry: Arc<TypedRegistry>,
    dispatch: Arc<dyn DispatchStrategy>,
    handler_timeout: Duration,
}

impl Runtime {
    pub fn new(
        registry: Arc<TypedRegistry>,
        dispatch: Arc<dyn DispatchStrategy>,
        handler_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            dispatch,
            handler_timeout,
        }
    }

    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    /// Execute one task.
    ///
    /// handler の `Err` だけが `Err` になります。それ以外はすべて Outcome です。
    pub async fn execute(&self, task: &Task) -> Result<Outcome, CourierError> {
        let Some(action) = self.dispatch.select_action(&task.payload) else {
            warn!(task_id = %task.id, "payload has no action discriminator");
            return Ok(Outcome::unhandled(None));
        };
        let Some(handler) = self.registry.get(&action) else {
            warn!(task_id = %task.id, %action, "no handler registered for action");
            return Ok(Outcome::unhandled(Some(&action)));
        };

        debug!(task_id = %task.id, %action, priority = %task.priority, "executing task");
        match tokio::time::timeout(self.handler_timeout, handler.handle_dyn(task)).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(source)) => Err(CourierError::Handler { action, source }),
            Err(_) => {
                warn!(task_id = %task.id, %action, timeout_ms = self.handler_timeout.as_millis() as u64, "handler deadline exceeded");
                Ok(Outcome::reschedule(format!(
                    "handler exceeded {}ms deadline",
                    self.handler_timeout.as_millis()
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::PayloadActionDispatch;
    use crate::typed::handler::tests::{Echo, EchoHandler, task_with};
    use crate::typed::{Action, Handler, HandlerError};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize)]
    struct Slow {}

    impl Action for Slow {
        const NAME: &'static str = "slow";
    }

    struct SlowHandler;

    #[async_trait]
    impl Handler<Slow> for SlowHandler {
        async fn handle(&self, _action: Slow, _task: &Task) -> Result<Outcome, HandlerError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Outcome::completed())
        }
    }

    fn runtime() -> Runtime {
        let mut registry = TypedRegistry::new();
        registry.register::<Echo, _>(EchoHandler).unwrap();
        registry.register::<Slow, _>(SlowHandler).unwrap();
        Runtime::new(
            Arc::new(registry),
            Arc::new(PayloadActionDispatch::new()),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn test_executes_registered_handler() {
        let outcome = runtime()
            .execute(&task_with(json!({"action": "echo", "value": 1})))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::Completed);
    }

    #[tokio::test]
    async fn test_unknown_action_is_unhandled() {
        let outcome = runtime()
            .execute(&task_with(json!({"action": "launch_rocket"})))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::unhandled(Some("launch_rocket")));
    }

    #[tokio::test]
    async fn test_missing_discriminator_is_unhandled() {
        let outcome = runtime()
            .execute(&task_with(json!({"value": 1})))
            .await
            .unwrap();
        assert_eq!(outcome, Outcome::unhandled(None));
    }

    #[tokio::test]
    async fn test_handler_error_is_propagated() {
        let err = runtime()
            .execute(&task_with(json!({"action": "echo", "value": 0})))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Handler { ref action, .. } if action == "echo"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_turns_into_reschedule() {
        let outcome = runtime()
            .execute(&task_with(json!({"action": "slow"})))
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Reschedule { .. }));
    }
}
