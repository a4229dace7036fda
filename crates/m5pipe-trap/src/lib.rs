//! # m5pipe-trap
//!
//! ホストへのトラップ呼び出し層。
//!
//! - [`Trap`]: トラップ命令の抽象。本番では [`M5Trap`]（gem5 の `m5_gpu` 疑似命令）、
//!   テストではゲストメモリを直接読み書きする疑似ホストを差し込む。
//! - [`ProcessContext`]: pid とプロセス共有のリクエスト ID カウンタ。
//! - [`Marshaler`]: 引数を [`m5pipe_abi::Request`] に詰めてトラップを発行し、戻り値を返す。
//!
//! ## 呼び出しの流れ
//!
//! ```text
//! Marshaler::call(op, args)
//!   1. unique_id = context.next_unique_id()
//!   2. Request::new(unique_id, pid, tid, args)
//!   3. trap.trap(op, request.header())   ← ホストが ret_ptr に結果を書くまでブロック
//!   4. request.return_value()
//! ```

pub mod context;
pub mod marshal;
pub mod trap;

pub use context::{current_tid, ProcessContext};
pub use marshal::Marshaler;
pub use trap::{M5Trap, Trap};
