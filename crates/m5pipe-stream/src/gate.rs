//! フロー制御ゲート
//!
//! 実データ操作の前に、長さ 0 の `block` プローブを 0（送信可）が返るまで繰り返す。
//! ホストは他のストリーム・プロセスを処理中かもしれず、通知チャネルがないため
//! ゲスト側はポーリングするしかない。
//!
//! ```text
//! loop {
//!     if trap(block, [0][0]) == 0 { break }   // 送信可
//!     sleep(interval)                         // 既定 10µs
//! }
//! ```

use std::time::Duration;

use m5pipe_abi::GraphicsCall;
use m5pipe_trap::{Marshaler, Trap};

use crate::error::StreamError;

/// ゲートのリトライ方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// busy のときに待つ時間
    pub interval: Duration,
    /// プローブ回数の上限（None = 無制限）
    pub max_probes: Option<u32>,
}

impl GatePolicy {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(10);

    pub fn unbounded(interval: Duration) -> Self {
        GatePolicy { interval, max_probes: None }
    }

    pub fn bounded(interval: Duration, max_probes: u32) -> Self {
        GatePolicy { interval, max_probes: Some(max_probes) }
    }
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self::unbounded(Self::DEFAULT_INTERVAL)
    }
}

/// ホストが受け付け可能になるまでブロックする
///
/// # 戻り値
/// 発行したプローブ回数（最後の成功したプローブを含む）
///
/// # エラー
/// - `StreamError::GateExhausted`: 有界ポリシーで上限に達した
pub fn wait_for_admission<T: Trap>(
    marshaler: &Marshaler<T>,
    policy: &GatePolicy,
) -> Result<u32, StreamError> {
    let mut probes: u32 = 0;
    loop {
        probes = probes.saturating_add(1);
        let status = marshaler.data_call(GraphicsCall::Block, 0, 0);
        if status == 0 {
            return Ok(probes);
        }

        if let Some(max) = policy.max_probes {
            if probes >= max {
                log::warn!("gate still busy after {} probes (last status {})", probes, status);
                return Err(StreamError::GateExhausted { probes });
            }
        }

        if !policy.interval.is_zero() {
            std::thread::sleep(policy.interval);
        }
    }
}
