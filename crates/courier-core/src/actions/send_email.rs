use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Outcome, Task};
use crate::typed::{Action, Handler, HandlerError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendEmail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

impl Action for SendEmail {
    const NAME: &'static str = "send_email";
}

pub struct SendEmailHandler {
    latency: Duration,
}

impl SendEmailHandler {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Handler<SendEmail> for SendEmailHandler {
    async fn handle(&self, action: SendEmail, task: &Task) -> Result<Outcome, HandlerError> {
        tokio::time::sleep(self.latency).await;
        info!(task_id = %task.id, recipient = action.recipient.as_deref().unwrap_or("<none>"), "email sent");
        Ok(Outcome::completed())
    }
}
