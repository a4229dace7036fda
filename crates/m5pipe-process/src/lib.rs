//! # m5pipe-process
//!
//! プロセス単位の一意 ID（puid）の取得。
//!
//! ホストはゲストプロセスに紐づくリソース（コンテキスト、サーフェスなど）を puid で
//! 管理し、プロセス終了時の後始末に使う。puid はプロセスにつき 1 回だけ決まり、
//! 以後どのスレッドから問い合わせても同じ値を返す。
//!
//! ## バックエンド
//!
//! | バックエンド | puid |
//! |--------------|------|
//! | [`Backend::Gem5Trap`] | `(pid << 32) \| tid`（最初に問い合わせたスレッドの tid） |
//! | [`Backend::QemuPipe`] | 未対応。[`ProcessError::Unsupported`] を返す |

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use m5pipe_trap::current_tid;

/// ホストとの通信経路
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// gem5 の m5op トラップ
    #[default]
    Gem5Trap,
    /// カーネルのパイプデバイス（このクレートでは扱わない）
    QemuPipe,
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Gem5Trap => write!(f, "gem5 trap"),
            Backend::QemuPipe => write!(f, "qemu pipe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    #[error("process pipe is not supported on the {0} backend")]
    Unsupported(Backend),
}

/// pid と tid から puid を組み立てる
pub fn compose_puid(pid: u32, tid: u32) -> u64 {
    ((pid as u64) << 32) | tid as u64
}

/// puid の 1 回限りの初期化セル
#[derive(Debug)]
pub struct PuidCell {
    cell: OnceLock<Result<u64, ProcessError>>,
}

impl PuidCell {
    pub const fn new() -> Self {
        PuidCell { cell: OnceLock::new() }
    }

    /// puid を返す。初回だけ `backend` に従って計算する
    ///
    /// 結果（失敗も含む）はキャッシュされ、2 回目以降の `backend` は無視される。
    pub fn get_or_init(&self, backend: Backend) -> Result<u64, ProcessError> {
        self.cell.get_or_init(|| negotiate(backend)).clone()
    }

    /// 初期化済みなら結果を返す
    pub fn get(&self) -> Option<&Result<u64, ProcessError>> {
        self.cell.get()
    }
}

impl Default for PuidCell {
    fn default() -> Self {
        Self::new()
    }
}

fn negotiate(backend: Backend) -> Result<u64, ProcessError> {
    log::info!(">> process pipe init ({})", backend);
    match backend {
        Backend::Gem5Trap => {
            let puid = compose_puid(std::process::id(), current_tid() as u32);
            log::debug!("process uid {:#x}", puid);
            Ok(puid)
        }
        Backend::QemuPipe => {
            log::warn!("process pipe failed: {} backend is not supported", backend);
            Err(ProcessError::Unsupported(backend))
        }
    }
}

static GLOBAL: PuidCell = PuidCell::new();

/// プロセス全体の puid（初回呼び出しで確定する）
pub fn process_uid(backend: Backend) -> Result<u64, ProcessError> {
    GLOBAL.get_or_init(backend)
}
