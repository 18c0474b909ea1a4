//! RateGate port - レート制限されたアクションの入場制御
//!
//! # 実装
//! - **WindowRateGate**（`impls::rate_gate`）: 固定ウィンドウの遅延解放カウンタ

/// RateGate は「いま 1 回実行してよいか」を答える
///
/// # 設計原則
/// - 拒否時は副作用なし
/// - 並行に呼ばれても上限を超えない
pub trait RateGate: Send + Sync {
    fn try_admit(&self) -> bool;

    /// いま空いている枠の数
    fn available(&self) -> u32;
}
