//! StatusReport - いまの状態のスナップショット
//!
//! 件数・処理中の task・取り残された task をまとめて返します（CLI は JSON で表示）。

use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use super::reaper_loop::stranded_horizon;
use crate::domain::TaskId;
use crate::error::CourierError;
use crate::ports::{Clock, StatusCounts, TaskStore};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub counts: StatusCounts,
    pub in_flight: Option<TaskId>,
    /// 期日 + grace を過ぎても終わっていない task（処理中のものは除く）
    pub stranded: Vec<TaskId>,
}

impl StatusReport {
    pub async fn collect(
        store: &dyn TaskStore,
        clock: &dyn Clock,
        in_flight: &watch::Receiver<Option<TaskId>>,
        grace: Duration,
    ) -> Result<Self, CourierError> {
        let counts = store.counts_by_status().await?;
        let in_flight = *in_flight.borrow();
        let stranded = store
            .find_stranded(stranded_horizon(clock, grace)?)
            .await?
            .into_iter()
            .map(|t| t.id)
            .filter(|id| Some(*id) != in_flight)
            .collect();
        Ok(Self {
            counts,
            in_flight,
            stranded,
        })
    }

    /// 未完了の task が残っていないか
    pub fn is_idle(&self) -> bool {
        self.counts.open() == 0 && self.in_flight.is_none()
    }
}
