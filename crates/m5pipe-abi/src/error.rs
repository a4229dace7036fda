//! m5pipe-abi エラー型

/// ABI 値の解釈エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// 未知のオペレーションコード
    UnknownCall(u64),
    /// 未知のデバッグコード
    UnknownDebugCall(u64),
    /// 引数インデックスが num_args を超えている
    ArgumentOutOfRange { index: usize, num_args: u64 },
    /// 引数の長さが期待値と一致しない
    ArgumentLength { expected: usize, actual: u64 },
}

impl core::fmt::Display for AbiError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AbiError::UnknownCall(code) => write!(f, "Unknown trap operation code: {}", code),
            AbiError::UnknownDebugCall(code) => write!(f, "Unknown debug code: {}", code),
            AbiError::ArgumentOutOfRange { index, num_args } => {
                write!(f, "Argument index {} out of range (num_args = {})", index, num_args)
            }
            AbiError::ArgumentLength { expected, actual } => {
                write!(f, "Argument length mismatch: expected {} bytes, got {}", expected, actual)
            }
        }
    }
}

impl core::error::Error for AbiError {}
