//! ストリーム統計

use serde::Serialize;

/// ストリームの累積統計（診断用）
///
/// ```json
/// {
///   "bytes_written": 102400,
///   "bytes_read": 4096,
///   "transfers": 27,
///   "chunk_calls": 30,
///   "gate_probes": 31,
///   "control_calls": 2,
///   "buffer_capacity": 10000,
///   "alloc_failures": 0
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// ホストが受け取った総バイト数
    pub bytes_written: u64,
    /// ホストから受け取った総バイト数
    pub bytes_read: u64,
    /// ゲート通過後の転送回数
    pub transfers: u64,
    /// read/write のチャンク単位のトラップ回数
    pub chunk_calls: u64,
    /// block プローブの回数
    pub gate_probes: u64,
    /// チャンク化しない呼び出し（debug など）の回数
    pub control_calls: u64,
    pub buffer_capacity: usize,
    pub alloc_failures: u64,
}

impl StreamStats {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
