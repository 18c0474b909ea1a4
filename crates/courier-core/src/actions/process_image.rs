use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::{Outcome, Task};
use crate::typed::{Action, Handler, HandlerError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl Action for ProcessImage {
    const NAME: &'static str = "process_image";
}

pub struct ProcessImageHandler {
    latency: Duration,
}

impl ProcessImageHandler {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl Handler<ProcessImage> for ProcessImageHandler {
    async fn handle(&self, action: ProcessImage, task: &Task) -> Result<Outcome, HandlerError> {
        tokio::time::sleep(self.latency).await;
        info!(task_id = %task.id, image_url = action.image_url.as_deref().unwrap_or("<none>"), "image processed");
        Ok(Outcome::completed())
    }
}
