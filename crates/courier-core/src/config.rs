//! Courier configuration types and loading
//!
//! すべてのキーは kebab-case で、省略したものはデフォルト値になります。
//!
//! ```yaml
//! queue:
//!   name: tasks
//!   prefetch: 1
//! rate-limit:
//!   limit: 5
//!   window-ms: 60000
//! worker:
//!   unknown-action: fail
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::UnknownActionPolicy;
use crate::ports::QueueSpec;

/// プロジェクトローカルの設定ファイル名
pub const LOCAL_CONFIG_FILE: &str = ".courier.yml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to render config: {0}")]
    Render(#[source] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main Courier configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CourierConfig {
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
    pub reschedule: RescheduleConfig,
    pub worker: WorkerConfig,
    pub reaper: ReaperConfig,
    pub actions: ActionsConfig,
}

impl CourierConfig {
    /// Load configuration with fallback chain
    ///
    /// 1. 明示されたパス（読めなければエラー）
    /// 2. `./.courier.yml`（壊れていれば warn してデフォルト）
    /// 3. デフォルト
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = Path::new(LOCAL_CONFIG_FILE);
        if local_config.exists() {
            match Self::load_from_file(local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("Loaded config from: {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        // 空ファイルは null になるのでデフォルト扱い
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Render)
    }

    /// Validate configuration before use
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.queue.name.trim().is_empty() {
            return invalid("queue.name must not be empty");
        }
        if self.queue.prefetch == 0 {
            return invalid("queue.prefetch must be at least 1");
        }
        if self.queue.redelivery_timeout_secs == 0 {
            return invalid("queue.redelivery-timeout-secs must be positive");
        }
        if self.rate_limit.limit == 0 {
            return invalid("rate-limit.limit must be at least 1");
        }
        if self.rate_limit.window_ms == 0 {
            return invalid("rate-limit.window-ms must be positive");
        }
        if self.worker.handler_timeout_ms == 0 {
            return invalid("worker.handler-timeout-ms must be positive");
        }
        if self.worker.max_defer_ms == 0 {
            return invalid("worker.max-defer-ms must be positive");
        }
        if self.reaper.enabled && self.reaper.interval_secs == 0 {
            return invalid("reaper.interval-secs must be positive when the reaper is enabled");
        }
        Ok(())
    }
}

/// Queue declaration and consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QueueConfig {
    pub name: String,
    pub durable: bool,
    /// ブローカー側の priority 上限（u8 なので 255 より大きい値は読み込み時に弾かれる）
    pub max_priority: u8,
    /// ack 待ちにできる配送の数
    pub prefetch: u16,
    /// ack されない配送をキューへ戻すまでの時間
    pub redelivery_timeout_secs: u64,
}

impl QueueConfig {
    pub fn spec(&self) -> QueueSpec {
        QueueSpec {
            name: self.name.clone(),
            durable: self.durable,
            max_priority: Some(self.max_priority),
        }
    }

    pub fn redelivery_timeout(&self) -> Duration {
        Duration::from_secs(self.redelivery_timeout_secs)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "tasks".to_string(),
            durable: true,
            max_priority: 10,
            prefetch: 1,
            redelivery_timeout_secs: 120,
        }
    }
}

/// Admission limit for rate-limited actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_ms: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RescheduleConfig {
    /// 一定のバックオフ（指数ではない）
    pub backoff_secs: u64,
}

impl RescheduleConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs)
    }
}

impl Default for RescheduleConfig {
    fn default() -> Self {
        Self { backoff_secs: 60 }
    }
}

/// Consumer loop behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct WorkerConfig {
    /// handler 1 回あたりの実行期限。超えたら Reschedule
    pub handler_timeout_ms: u64,
    /// 期日前の entry を保留する最大時間
    pub max_defer_ms: u64,
    pub unknown_action: UnknownActionPolicy,
}

impl WorkerConfig {
    pub fn handler_timeout(&self) -> Duration {
        Duration::from_millis(self.handler_timeout_ms)
    }

    pub fn max_defer(&self) -> Duration {
        Duration::from_millis(self.max_defer_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            handler_timeout_ms: 30_000,
            max_defer_ms: 60_000,
            unknown_action: UnknownActionPolicy::Complete,
        }
    }
}

/// Recovery sweep for stranded tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReaperConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// 期日からこの時間が過ぎても終わっていない task を拾い直す
    pub grace_secs: u64,
}

impl ReaperConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            grace_secs: 120,
        }
    }
}

/// Simulated latency of the built-in actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ActionsConfig {
    pub fetch_data_ms: u64,
    pub send_email_ms: u64,
    pub process_image_ms: u64,
}

impl ActionsConfig {
    pub fn fetch_data(&self) -> Duration {
        Duration::from_millis(self.fetch_data_ms)
    }

    pub fn send_email(&self) -> Duration {
        Duration::from_millis(self.send_email_ms)
    }

    pub fn process_image(&self) -> Duration {
        Duration::from_millis(self.process_image_ms)
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            fetch_data_ms: 1_000,
            send_email_ms: 2_000,
            process_image_ms: 3_000,
        }
    }
}
