//! 致命的エラーの扱い
//!
//! トランスポートの不整合はホストとゲストの非同期化を意味し、継続できない。
//! 診断メッセージとコールスタックを出力してから、方針に従ってプロセスを終了する。

use std::backtrace::Backtrace;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// 致命的エラー発生時の動作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FatalPolicy {
    /// `std::process::abort()`（本番）
    #[default]
    Abort,
    /// `panic!`（テストや、呼び出し側が unwind で後始末したい場合）
    Panic,
}

impl FatalPolicy {
    /// 診断を出力して終了する
    pub fn escalate(self, operation: &str, err: &StreamError) -> ! {
        let backtrace = Backtrace::force_capture();
        log::error!("{} failed: {}, lethal error, exiting", operation, err);
        log::error!("call stack:\n{}", backtrace);

        match self {
            FatalPolicy::Abort => {
                // ロガー未初期化でも残るように stderr にも出す
                eprintln!("m5pipe: {} failed: {}, lethal error, exiting", operation, err);
                std::process::abort()
            }
            FatalPolicy::Panic => panic!("{} failed: {}", operation, err),
        }
    }
}
