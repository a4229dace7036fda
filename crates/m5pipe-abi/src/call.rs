//! トラップのオペレーションコードとデバッグコード
//!
//! ```text
//! 100 write          101 read         102 graphics_mem   103 block
//! 104 debug          105 call_buffer_fail                106 sim_active
//! 107 get_proc_id
//! ```

use crate::error::AbiError;

/// GPU 系トラップ呼び出しの開始番号（ホスト側 `cuda_syscalls.h` と一致）
pub const GPU_CALLS_START: u64 = 100;

/// トラップのオペレーションコード
///
/// 既存の値はホストと合意済みの ABI。新しいコードは末尾に追加すること。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum GraphicsCall {
    /// ゲスト → ホストへのデータ書き込み
    Write = GPU_CALLS_START,
    /// ホスト → ゲストへのデータ読み出し
    Read = GPU_CALLS_START + 1,
    /// グラフィックスメモリの確保
    GraphicsMem = GPU_CALLS_START + 2,
    /// フロー制御プローブ（0 = 送信可）
    Block = GPU_CALLS_START + 3,
    /// ホストへのデバッグ通知
    Debug = GPU_CALLS_START + 4,
    /// 呼び出しバッファ確保失敗の通知
    CallBufferFail = GPU_CALLS_START + 5,
    /// シミュレーションが有効か
    SimActive = GPU_CALLS_START + 6,
    /// ホストからのプロセス ID 取得
    GetProcId = GPU_CALLS_START + 7,
}

impl GraphicsCall {
    /// トラップに渡す数値コード
    pub const fn code(self) -> u64 {
        self as u64
    }

    /// ページ単位のチャンク転送とページタッチが必要か
    ///
    /// ホストがゲストメモリを直接読み書きするのは read/write のみ。
    pub const fn needs_page_touch(self) -> bool {
        matches!(self, GraphicsCall::Write | GraphicsCall::Read)
    }

    /// ログ用の名前
    pub const fn name(self) -> &'static str {
        match self {
            GraphicsCall::Write => "write",
            GraphicsCall::Read => "read",
            GraphicsCall::GraphicsMem => "graphics_mem",
            GraphicsCall::Block => "block",
            GraphicsCall::Debug => "debug",
            GraphicsCall::CallBufferFail => "call_buffer_fail",
            GraphicsCall::SimActive => "sim_active",
            GraphicsCall::GetProcId => "get_proc_id",
        }
    }
}

impl TryFrom<u64> for GraphicsCall {
    type Error = AbiError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        let call = match code {
            100 => GraphicsCall::Write,
            101 => GraphicsCall::Read,
            102 => GraphicsCall::GraphicsMem,
            103 => GraphicsCall::Block,
            104 => GraphicsCall::Debug,
            105 => GraphicsCall::CallBufferFail,
            106 => GraphicsCall::SimActive,
            107 => GraphicsCall::GetProcId,
            other => return Err(AbiError::UnknownCall(other)),
        };
        Ok(call)
    }
}

impl core::fmt::Display for GraphicsCall {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}({})", self.name(), self.code())
    }
}

/// `GraphicsCall::Debug` の第 1 引数として送るサブコード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum DebugCall {
    GmemAllocFail = 0,
    GmemLockFail = 1,
    /// パイプバッファの確保失敗
    PipeMemAllocFail = 2,
    /// 任意の数値情報（ページサイズ、RLIMIT_MEMLOCK など）
    Info = 3,
    /// パイプバッファの確保（第 2 引数 = サイズ）
    PipeMemAlloc = 4,
}

impl DebugCall {
    pub const fn code(self) -> u64 {
        self as u64
    }
}

impl TryFrom<u64> for DebugCall {
    type Error = AbiError;

    fn try_from(code: u64) -> Result<Self, Self::Error> {
        let call = match code {
            0 => DebugCall::GmemAllocFail,
            1 => DebugCall::GmemLockFail,
            2 => DebugCall::PipeMemAllocFail,
            3 => DebugCall::Info,
            4 => DebugCall::PipeMemAlloc,
            other => return Err(AbiError::UnknownDebugCall(other)),
        };
        Ok(call)
    }
}
