//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 差し替え可能な依存（store / queue / clock / dispatch）

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use super::handle::AppHandle;
use super::publisher::EntryPublisher;
use super::reaper_loop::ReaperLoop;
use super::reschedule::Rescheduler;
use super::runtime::Runtime;
use super::status::StatusReport;
use super::submission::Submitter;
use super::worker_loop::{WorkerLoop, WorkerSettings};
use crate::config::CourierConfig;
use crate::error::CourierError;
use crate::impls::{InMemoryDeliveryQueue, InMemoryTaskStore, PayloadActionDispatch};
use crate::ports::{Clock, DeliveryQueue, DispatchStrategy, SystemClock, TaskStore};
use crate::typed::{Action, Handler, RegistryError, TypedRegistry};

/// AppBuilder はアプリケーションを構築
///
/// # 使用例
/// ```ignore
/// let app = AppBuilder::new()
///     .config(config)
///     .register::<SendEmail, _>(SendEmailHandler)?
///     .expect_actions(&["send_email"])
///     .build()?;
/// let handle = app.start().await?;
/// ```
///
/// # Fail-fast 設計
/// - config は build() 時に validate する
/// - expect_actions() で期待される action 名を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
pub struct AppBuilder {
    registry: TypedRegistry,
    expected_actions: Option<Vec<String>>,
    config: CourierConfig,
    store: Option<Arc<dyn TaskStore>>,
    queue: Option<Arc<dyn DeliveryQueue>>,
    clock: Option<Arc<dyn Clock>>,
    dispatch: Option<Arc<dyn DispatchStrategy>>,
}

impl AppBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected_actions: None,
            config: CourierConfig::default(),
            store: None,
            queue: None,
            clock: None,
            dispatch: None,
        }
    }

    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = config;
        self
    }

    /// Handler を登録
    pub fn register<A: Action, H: Handler<A> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<A, H>(handler)?;
        Ok(self)
    }

    /// 期待される action 名のリストを設定
    pub fn expect_actions(mut self, actions: &[&str]) -> Self {
        self.expected_actions = Some(actions.iter().map(|a| a.to_string()).collect());
        self
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_queue(mut self, queue: Arc<dyn DeliveryQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_dispatch(mut self, dispatch: Arc<dyn DispatchStrategy>) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    /// AppBuilder を構築して App を生成
    ///
    /// # 検証
    /// - config が不正なら CourierError::Config
    /// - expect_actions() の action が未登録なら CourierError::MissingActions
    pub fn build(self) -> Result<App, CourierError> {
        self.config.validate()?;

        if let Some(expected) = &self.expected_actions {
            let missing: Vec<String> = expected
                .iter()
                .filter(|name| !self.registry.contains(name))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(CourierError::MissingActions(missing));
            }
        }

        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn TaskStore> = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new(Arc::clone(&clock))));
        let queue: Arc<dyn DeliveryQueue> = self.queue.unwrap_or_else(|| {
            Arc::new(InMemoryDeliveryQueue::with_redelivery_timeout(Some(
                config.queue.redelivery_timeout(),
            )))
        });
        let dispatch: Arc<dyn DispatchStrategy> = self
            .dispatch
            .unwrap_or_else(|| Arc::new(PayloadActionDispatch::new()));

        let publisher = EntryPublisher::new(Arc::clone(&queue), config.queue.name.clone());
        let runtime = Arc::new(Runtime::new(
            Arc::new(self.registry),
            dispatch,
            config.worker.handler_timeout(),
        ));
        let rescheduler = Arc::new(Rescheduler::new(
            Arc::clone(&store),
            publisher.clone(),
            Arc::clone(&clock),
            config.reschedule.backoff(),
        ));
        let worker = Arc::new(WorkerLoop::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&runtime),
            rescheduler,
            Arc::clone(&clock),
            WorkerSettings {
                queue: config.queue.spec(),
                prefetch: config.queue.prefetch,
                max_defer: config.worker.max_defer(),
                unknown_action: config.worker.unknown_action,
            },
        ));
        let reaper = Arc::new(ReaperLoop::new(
            Arc::clone(&store),
            publisher.clone(),
            Arc::clone(&clock),
            worker.in_flight(),
            config.reaper.interval(),
            config.reaper.grace(),
        ));
        let submitter = Submitter::new(Arc::clone(&store), publisher);

        Ok(App {
            config,
            store,
            queue,
            clock,
            runtime,
            submitter,
            worker,
            reaper,
        })
    }
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// App は組み上がったアプリケーション
///
/// store / queue はプロセス内で 1 つだけ作り、submission / worker /
/// reschedule / reaper で共有します。
pub struct App {
    config: CourierConfig,
    store: Arc<dyn TaskStore>,
    queue: Arc<dyn DeliveryQueue>,
    clock: Arc<dyn Clock>,
    runtime: Arc<Runtime>,
    submitter: Submitter,
    worker: Arc<WorkerLoop>,
    reaper: Arc<ReaperLoop>,
}

impl App {
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn DeliveryQueue> {
        &self.queue
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn submitter(&self) -> &Submitter {
        &self.submitter
    }

    pub fn worker(&self) -> &Arc<WorkerLoop> {
        &self.worker
    }

    pub fn reaper(&self) -> &Arc<ReaperLoop> {
        &self.reaper
    }

    /// キューを宣言する（冪等）
    pub async fn declare_queue(&self) -> Result<(), CourierError> {
        self.queue.declare_queue(&self.config.queue.spec()).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusReport, CourierError> {
        StatusReport::collect(
            self.store.as_ref(),
            self.clock.as_ref(),
            &self.worker.in_flight(),
            self.config.reaper.grace(),
        )
        .await
    }

    /// キューを宣言し、worker（と有効なら reaper）を起動する
    pub async fn start(&self) -> Result<AppHandle, CourierError> {
        self.declare_queue().await?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handle = AppHandle::new(shutdown_tx);

        let worker = Arc::clone(&self.worker);
        let rx = shutdown_rx.clone();
        handle.push("worker", tokio::spawn(async move { worker.run(rx).await }));

        if self.config.reaper.enabled {
            let reaper = Arc::clone(&self.reaper);
            let rx = shutdown_rx.clone();
            handle.push("reaper", tokio::spawn(async move { reaper.run(rx).await }));
        }

        info!(
            queue = %self.config.queue.name,
            actions = ?self.runtime.registry().registered_actions(),
            tasks = ?handle.tasks(),
            "courier started"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReaperConfig;
    use crate::domain::{NewTask, Priority, TaskStatus};
    use crate::typed::handler::tests::{Echo, EchoHandler, Shout, ShoutHandler};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_build_success() {
        let app = AppBuilder::new()
            .register::<Echo, _>(EchoHandler)
            .unwrap()
            .expect_actions(&[Echo::NAME])
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_build_missing_actions() {
        let app = AppBuilder::new()
            .register::<Echo, _>(EchoHandler)
            .unwrap()
            .expect_actions(&[Echo::NAME, Shout::NAME])
            .build();
        assert!(matches!(
            app,
            Err(CourierError::MissingActions(missing)) if missing == vec![Shout::NAME.to_string()]
        ));
    }

    #[test]
    fn test_build_no_expect_actions() {
        let app = AppBuilder::new()
            .register::<Echo, _>(EchoHandler)
            .unwrap()
            .register::<Shout, _>(ShoutHandler)
            .unwrap()
            .build();
        assert!(app.is_ok());
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = AppBuilder::new()
            .register::<Echo, _>(EchoHandler)
            .unwrap()
            .register::<Echo, _>(EchoHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(_))));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = CourierConfig::default();
        config.queue.prefetch = 0;
        let app = AppBuilder::new().config(config).build();
        assert!(matches!(app, Err(CourierError::Config(_))));
    }

    #[tokio::test]
    async fn test_start_processes_and_shuts_down() {
        let config = CourierConfig {
            reaper: ReaperConfig {
                enabled: false,
                ..ReaperConfig::default()
            },
            ..CourierConfig::default()
        };
        let app = AppBuilder::new()
            .config(config)
            .register::<Echo, _>(EchoHandler)
            .unwrap()
            .build()
            .unwrap();

        let handle = app.start().await.unwrap();
        assert_eq!(handle.tasks(), vec!["worker"]);

        let id = app
            .submitter()
            .create_task(NewTask::new(
                Priority::new(2).unwrap(),
                json!({"action": "echo", "value": 7}),
            ))
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = app.status().await.unwrap();
                if status.is_idle() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let task = app.store().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        handle.shutdown_and_join().await.unwrap();
    }
}
