//! Action trait - 型付き action の定義
//!
//! payload の `action` フィールドと Rust の型を対応付けます。
//!
//! # 学習ポイント
//! - Associated Constants (`const NAME`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Action は payload の判別子と型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// #[serde(rename_all = "camelCase")]
/// struct SendEmail {
///     to: String,
///     subject: String,
/// }
///
/// impl Action for SendEmail {
///     const NAME: &'static str = "send_email";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize`: payload を組み立てるため
/// - `DeserializeOwned`: 正本の payload から復元するため
/// - `Send + Sync + 'static`: handler と一緒に Arc に格納できるため
pub trait Action: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// payload の `action` フィールドに入る名前
    const NAME: &'static str;
}
