//! トラップ命令の抽象

use std::sync::Arc;

use m5pipe_abi::{GpuSyscall, GraphicsCall};

/// ホストへのトラップ命令
///
/// 実装は同期的であること。戻った時点でホストは `request.ret_ptr` への書き込みを
/// 終えている。トラップ自体は失敗しない（失敗は戻り値スロットの値でのみ表現される）。
pub trait Trap {
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall);
}

impl<T: Trap + ?Sized> Trap for &T {
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall) {
        (**self).trap(call, request)
    }
}

impl<T: Trap + ?Sized> Trap for Box<T> {
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall) {
        (**self).trap(call, request)
    }
}

impl<T: Trap + ?Sized> Trap for Arc<T> {
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall) {
        (**self).trap(call, request)
    }
}

#[cfg(feature = "m5op")]
#[link(name = "m5")]
extern "C" {
    fn m5_gpu(gpusysno: u64, call_params: u64);
}

/// gem5 の `m5_gpu` 疑似命令
///
/// `m5op` feature なしでビルドした場合は何もしない（x86 ホストビルドと同じ扱いで、
/// 戻り値スロットは 0 のまま）。
#[derive(Debug, Clone, Copy, Default)]
pub struct M5Trap;

impl Trap for M5Trap {
    #[cfg(feature = "m5op")]
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall) {
        let address = request as *const GpuSyscall as usize as u64;
        // SAFETY: request はトラップ中ずっと生存し、ホストは ABI どおりに読み書きする
        unsafe { m5_gpu(call.code(), address) }
    }

    #[cfg(not(feature = "m5op"))]
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall) {
        log::trace!("m5_gpu stub: {} (unique_id={})", call, request.unique_id);
    }
}
