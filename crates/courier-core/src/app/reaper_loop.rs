//! ReaperLoop - 取り残された task の回収
//!
//! # フロー（`interval` ごと）
//! 1. TaskStore::find_stranded(now - grace) で期日を過ぎた未完了 task を取得
//! 2. いま worker が処理中の task は除外
//! 3. 直近 `grace` 以内に publish し直した task も除外
//! 4. entry を publish し直す
//!
//! 元の entry がまだキューの後ろで待っているだけの task とは区別できないので、
//! 1 task あたり `grace` ごとに高々 1 件しか足しません。それでも出る重複は
//! consumer 側の終端チェックで吸収されます。

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::publisher::EntryPublisher;
use crate::domain::TaskId;
use crate::error::CourierError;
use crate::ports::{Clock, TaskStore};

pub struct ReaperLoop {
    store: Arc<dyn TaskStore>,
    publisher: EntryPublisher,
    clock: Arc<dyn Clock>,
    in_flight: watch::Receiver<Option<TaskId>>,
    interval: Duration,
    grace: Duration,
    /// task id -> 最後に publish し直した時刻
    republished: Mutex<HashMap<TaskId, DateTime<Utc>>>,
}

impl ReaperLoop {
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: EntryPublisher,
        clock: Arc<dyn Clock>,
        in_flight: watch::Receiver<Option<TaskId>>,
        interval: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            clock,
            in_flight,
            interval,
            grace,
            republished: Mutex::new(HashMap::new()),
        }
    }

    fn ledger(&self) -> MutexGuard<'_, HashMap<TaskId, DateTime<Utc>>> {
        self.republished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// 1 回分の回収。publish し直した task id を返す
    pub async fn sweep_once(&self) -> Result<Vec<TaskId>, CourierError> {
        let now = self.clock.now();
        let before = horizon_at(now, self.grace)?;
        let in_flight = *self.in_flight.borrow();
        let stranded = self.store.find_stranded(before).await?;

        let candidates: Vec<_> = {
            let mut ledger = self.ledger();
            // 取り残しでなくなった task は忘れる
            let ids: HashSet<TaskId> = stranded.iter().map(|t| t.id).collect();
            ledger.retain(|id, _| ids.contains(id));

            stranded
                .into_iter()
                .filter(|t| Some(t.id) != in_flight)
                .filter(|t| ledger.get(&t.id).is_none_or(|at| *at <= before))
                .collect()
        };

        let mut republished = Vec::new();
        for task in candidates {
            warn!(task_id = %task.id, status = %task.status, due_at = %task.due_at(), "republishing stranded task");
            self.publisher.publish(&task, None).await?;
            self.ledger().insert(task.id, now);
            republished.push(task.id);
        }

        if !republished.is_empty() {
            info!(count = republished.len(), "stranded tasks republished");
        }
        Ok(republished)
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), CourierError> {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), grace_secs = self.grace.as_secs(), "reaper started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!(kind = ?e.kind(), error = %e, "sweep failed");
                    }
                }
            }
        }

        info!("reaper stopped");
        Ok(())
    }
}

/// `now - grace`。これより前に期日を迎えた未完了 task が「取り残し」
pub(crate) fn stranded_horizon(
    clock: &dyn Clock,
    grace: Duration,
) -> Result<DateTime<Utc>, CourierError> {
    horizon_at(clock.now(), grace)
}

fn horizon_at(now: DateTime<Utc>, grace: Duration) -> Result<DateTime<Utc>, CourierError> {
    let grace = chrono::Duration::from_std(grace).map_err(|_| CourierError::ClockOverflow)?;
    now.checked_sub_signed(grace)
        .ok_or(CourierError::ClockOverflow)
}
