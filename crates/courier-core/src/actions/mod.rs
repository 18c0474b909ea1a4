//! Actions - 組み込みの action handler
//!
//! どれも外部呼び出しを模した一定時間の待ちだけを行います。
//! `fetch_data` だけはレート制限の対象です。
//!
//! | action | payload | 待ち |
//! |---|---|---|
//! | `fetch_data` | `{"entity": ...}` | `actions.fetch-data-ms` |
//! | `send_email` | `{"recipient": ...}` | `actions.send-email-ms` |
//! | `process_image` | `{"imageUrl": ...}` | `actions.process-image-ms` |

pub mod fetch_data;
pub mod process_image;
pub mod send_email;

use std::sync::Arc;

pub use self::fetch_data::{FetchData, FetchDataHandler};
pub use self::process_image::{ProcessImage, ProcessImageHandler};
pub use self::send_email::{SendEmail, SendEmailHandler};

use crate::app::AppBuilder;
use crate::config::ActionsConfig;
use crate::ports::RateGate;
use crate::typed::{Action, RegistryError};

/// 組み込み action の名前
pub const BUILTIN_ACTIONS: [&str; 3] = [FetchData::NAME, SendEmail::NAME, ProcessImage::NAME];

/// 組み込み handler をまとめて登録する
pub fn register_builtins(
    builder: AppBuilder,
    gate: Arc<dyn RateGate>,
    latency: &ActionsConfig,
) -> Result<AppBuilder, RegistryError> {
    Ok(builder
        .register::<FetchData, _>(FetchDataHandler::new(gate, latency.fetch_data()))?
        .register::<SendEmail, _>(SendEmailHandler::new(latency.send_email()))?
        .register::<ProcessImage, _>(ProcessImageHandler::new(latency.process_image()))?
        .expect_actions(&BUILTIN_ACTIONS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::WindowRateGate;
    use std::time::Duration;

    #[test]
    fn test_register_builtins() {
        let gate = Arc::new(WindowRateGate::new(5, Duration::from_secs(60)));
        let app = register_builtins(AppBuilder::new(), gate, &ActionsConfig::default())
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            app.runtime().registry().registered_actions(),
            vec!["fetch_data", "process_image", "send_email"]
        );
    }
}
