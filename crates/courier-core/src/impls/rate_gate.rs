//! WindowRateGate - 遅延解放カウンタによるレート制限
//!
//! # 実装詳細
//! - 使用中の枠を AtomicU32 で数える（compare-and-swap で上限を守る）
//! - 入場が認められたら `window` 後に枠を 1 つ返すタスクを spawn する
//! - 拒否時はカウンタに触れない
//!
//! 厳密なスライディングウィンドウではありません。ウィンドウ境界で短時間に
//! `limit` を超えるバーストが起こりえます。

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::config::RateLimitConfig;
use crate::ports::RateGate;

pub struct WindowRateGate {
    limit: u32,
    window: Duration,
    in_use: Arc<AtomicU32>,
}

impl WindowRateGate {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            in_use: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, config.window())
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn acquire(&self) -> bool {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.limit).then_some(used + 1)
            })
            .is_ok()
    }
}

impl RateGate for WindowRateGate {
    fn try_admit(&self) -> bool {
        if !self.acquire() {
            debug!(limit = self.limit, "rate gate denied admission");
            return false;
        }

        // 解放タイマーを置けないなら入場も取り消す
        let Ok(handle) = Handle::try_current() else {
            self.in_use.fetch_sub(1, Ordering::AcqRel);
            warn!("rate gate used outside of a tokio runtime, admission rolled back");
            return false;
        };

        let in_use = Arc::clone(&self.in_use);
        let window = self.window;
        handle.spawn(async move {
            tokio::time::sleep(window).await;
            in_use.fetch_sub(1, Ordering::AcqRel);
        });
        true
    }

    fn available(&self) -> u32 {
        self.limit
            .saturating_sub(self.in_use.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_deny() {
        let gate = WindowRateGate::new(5, WINDOW);
        for _ in 0..5 {
            assert!(gate.try_admit());
        }
        assert!(!gate.try_admit());
        assert_eq!(gate.available(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_is_released_after_window() {
        let gate = WindowRateGate::new(2, WINDOW);
        assert!(gate.try_admit());
        assert!(gate.try_admit());
        assert!(!gate.try_admit());

        tokio::time::sleep(WINDOW - Duration::from_millis(1)).await;
        assert!(!gate.try_admit());

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(gate.available(), 2);
        assert!(gate.try_admit());
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_call_does_not_consume() {
        let gate = WindowRateGate::new(1, WINDOW);
        assert!(gate.try_admit());
        for _ in 0..10 {
            assert!(!gate.try_admit());
        }

        // 拒否した 10 回分の解放は走らないので、ウィンドウ後は満タン
        tokio::time::sleep(WINDOW + Duration::from_millis(1)).await;
        assert_eq!(gate.available(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_never_exceed_limit() {
        let gate = Arc::new(WindowRateGate::new(5, WINDOW));
        let mut joins = Vec::new();
        for _ in 0..64 {
            let gate = Arc::clone(&gate);
            joins.push(tokio::spawn(async move { gate.try_admit() }));
        }

        let mut admitted = 0;
        for join in joins {
            if join.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[test]
    fn test_outside_runtime_rolls_back() {
        let gate = WindowRateGate::new(1, WINDOW);
        assert!(!gate.try_admit());
        assert_eq!(gate.available(), 1);
    }

    #[test]
    fn test_from_config() {
        let gate = WindowRateGate::from_config(&RateLimitConfig {
            limit: 3,
            window_ms: 1500,
        });
        assert_eq!(gate.limit(), 3);
        assert_eq!(gate.window(), Duration::from_millis(1500));
    }
}
