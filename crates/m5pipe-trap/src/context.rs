//! プロセス単位の呼び出しコンテキスト

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// プロセス共有の状態（pid とリクエスト ID カウンタ）
///
/// unique_id はホスト側のトレース用タグ。ストリームをまたいでプロセス全体で単調増加するが、
/// 複数スレッドからの同時発行では発行順とトラップ到達順が一致するとは限らない。
#[derive(Debug)]
pub struct ProcessContext {
    pid: i32,
    /// 最後に払い出した unique_id（0 = 未発行）
    last_unique_id: AtomicU64,
}

static GLOBAL: OnceLock<Arc<ProcessContext>> = OnceLock::new();

impl ProcessContext {
    /// 現在のプロセスの pid でコンテキストを生成する
    pub fn new() -> Self {
        Self::with_pid(std::process::id() as i32)
    }

    /// pid を指定して生成する（テスト用）
    pub fn with_pid(pid: i32) -> Self {
        ProcessContext {
            pid,
            last_unique_id: AtomicU64::new(0),
        }
    }

    /// プロセス全体で共有する既定のコンテキスト
    pub fn global() -> Arc<ProcessContext> {
        GLOBAL.get_or_init(|| Arc::new(ProcessContext::new())).clone()
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    /// 次の unique_id を払い出す（1 始まり）
    pub fn next_unique_id(&self) -> u64 {
        self.last_unique_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    /// 最後に払い出した unique_id
    pub fn last_unique_id(&self) -> u64 {
        self.last_unique_id.load(Ordering::Relaxed)
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new()
    }
}

/// 呼び出しスレッドのカーネル tid
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn current_tid() -> i32 {
    // SAFETY: gettid は引数を取らず失敗しない
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn current_tid() -> i32 {
    0
}
