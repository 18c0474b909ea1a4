//! fetch_data - レート制限された外部 API 呼び出し（模擬）
//!
//! 入場できなければ何もせずに Reschedule を返します。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Outcome, Task};
use crate::ports::RateGate;
use crate::typed::{Action, Handler, HandlerError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
}

impl Action for FetchData {
    const NAME: &'static str = "fetch_data";
}

pub struct FetchDataHandler {
    gate: Arc<dyn RateGate>,
    latency: Duration,
}

impl FetchDataHandler {
    pub fn new(gate: Arc<dyn RateGate>, latency: Duration) -> Self {
        Self { gate, latency }
    }
}

#[async_trait]
impl Handler<FetchData> for FetchDataHandler {
    async fn handle(&self, action: FetchData, task: &Task) -> Result<Outcome, HandlerError> {
        if !self.gate.try_admit() {
            info!(task_id = %task.id, "rate limit reached, rescheduling");
            return Ok(Outcome::reschedule("rate limit reached"));
        }

        tokio::time::sleep(self.latency).await;
        info!(task_id = %task.id, entity = action.entity.as_deref().unwrap_or("<none>"), "data fetched");
        Ok(Outcome::completed())
    }
}
