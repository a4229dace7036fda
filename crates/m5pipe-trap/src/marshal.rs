//! リクエストのマーシャリングとトラップ発行

use std::sync::Arc;

use m5pipe_abi::{ArgPack, GraphicsCall, Request};

use crate::context::{current_tid, ProcessContext};
use crate::trap::Trap;

/// トラップ呼び出しのマーシャラー
///
/// 呼び出しごとに新しい [`Request`] を組み立て、トラップが戻ったら破棄する。
pub struct Marshaler<T> {
    trap: T,
    context: Arc<ProcessContext>,
}

impl<T: Trap> Marshaler<T> {
    pub fn new(trap: T, context: Arc<ProcessContext>) -> Self {
        Marshaler { trap, context }
    }

    /// 任意の引数でトラップを発行し、ホストの戻り値を返す
    ///
    /// 戻り値の意味はオペレーションごとに異なる（read/write なら処理バイト数、
    /// block なら 0 = 送信可）。
    pub fn call(&self, call: GraphicsCall, args: ArgPack) -> i32 {
        let unique_id = self.context.next_unique_id();
        let request = Request::new(unique_id, self.context.pid(), current_tid(), args);

        log::trace!(
            "trap {} (pid, tid, unique_id) = ({}, {}, {})",
            call,
            request.header().pid,
            request.header().tid,
            unique_id
        );

        self.trap.trap(call, request.header());
        request.return_value()
    }

    /// `[address][len]` の 2 引数でトラップを発行する
    pub fn data_call(&self, call: GraphicsCall, address: u64, len: u64) -> i32 {
        self.call(call, ArgPack::data(address, len))
    }

    pub fn trap(&self) -> &T {
        &self.trap
    }

    pub fn context(&self) -> &Arc<ProcessContext> {
        &self.context
    }
}
