//! m5pipe-stream エラー型

use m5pipe_abi::GraphicsCall;

/// ストリーム操作のエラー
///
/// [`StreamError::is_fatal`] が true のものはホストとゲストの同期が崩れたことを意味し、
/// 呼び出し側は処理を継続してはならない（[`crate::FatalPolicy`] を参照）。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// 送信バッファの確保・拡張に失敗
    #[error("buffer allocation failed ({requested} bytes)")]
    BufferAllocationFailed { requested: usize },

    /// null バッファと非ゼロ長の組み合わせ、またはバッファ長を超える長さ
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 書き込みが全バイト送信前に 0 バイトで止まった
    #[error("premature EOF: {sent} bytes sent, {remaining} bytes remaining")]
    PrematureChannelClose { sent: usize, remaining: usize },

    /// チャンク転送がホストからエラー（負値または過大な値）を受け取った
    #[error("transport fault on {call}: host returned {code}")]
    TransportFault { call: GraphicsCall, code: i32 },

    /// 有界ゲートポリシーでプローブ回数を使い切った
    #[error("flow-control gate still busy after {probes} probes")]
    GateExhausted { probes: u32 },

    /// read_fully 中にホストが 0 バイトを返した（クライアント切断）
    #[error("channel closed by host: {received} bytes received, {remaining} bytes remaining")]
    ChannelClosed { received: usize, remaining: usize },

    /// 単発 read で進捗なし
    #[error("read made no progress (host returned {code})")]
    NoProgress { code: i32 },
}

impl StreamError {
    /// プロセスを継続できないエラーか
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::InvalidArgument(_)
                | StreamError::PrematureChannelClose { .. }
                | StreamError::TransportFault { .. }
                | StreamError::GateExhausted { .. }
        )
    }
}

/// 設定の読み込みエラー
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid stream config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("page size must be non-zero")]
    ZeroPageSize,

    #[error("buffer_size {buffer_size} exceeds max_buffer_size {max}")]
    BufferLimit { buffer_size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(StreamError::InvalidArgument("x".into()).is_fatal());
        assert!(StreamError::PrematureChannelClose { sent: 0, remaining: 1 }.is_fatal());
        assert!(StreamError::TransportFault { call: GraphicsCall::Write, code: -1 }.is_fatal());
        assert!(StreamError::GateExhausted { probes: 3 }.is_fatal());

        assert!(!StreamError::BufferAllocationFailed { requested: 1 }.is_fatal());
        assert!(!StreamError::ChannelClosed { received: 0, remaining: 1 }.is_fatal());
        assert!(!StreamError::NoProgress { code: 0 }.is_fatal());
    }

    #[test]
    fn test_display() {
        let err = StreamError::TransportFault { call: GraphicsCall::Read, code: -22 };
        assert_eq!(err.to_string(), "transport fault on read(101): host returned -22");
    }
}
