//! プロセス内ループバックホスト
//!
//! gem5 を使わずにゲスト側スタックを動かすための疑似ホスト。
//! write で受け取ったバイトをキューに積み、read でそのまま返す（エコー）。
//!
//! - block プローブ: `with_busy_probes(n)` の回数だけ busy(1) を返し、その後は 0
//! - read/write: `script()` で積んだ値があればそれを戻り値にする。なければ
//!   `with_max_chunk(n)` を上限に処理したバイト数を返す
//! - それ以外（debug など）: 記録して 0 を返す
//!
//! ホストはリクエストに含まれるアドレスを直接読み書きするので、同一プロセス内の
//! [`m5pipe_trap::Marshaler`] 経由でのみ使うこと。

use std::collections::VecDeque;
use std::sync::Mutex;

use m5pipe_abi::{guest_bytes, guest_bytes_mut, GpuSyscall, GraphicsCall};
use m5pipe_trap::Trap;

/// ホストが受け取った 1 回分のトラップ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call: GraphicsCall,
    pub unique_id: u64,
    pub pid: i32,
    pub tid: i32,
    /// 第 1 引数（データ系ではアドレス、debug ではサブコード）
    pub address: u64,
    /// 第 2 引数（データ系では長さ、debug では値）
    pub len: u64,
    pub ret: i32,
}

#[derive(Debug, Default)]
struct HostState {
    busy_probes: u32,
    max_chunk: Option<usize>,
    scripted: VecDeque<i32>,
    /// ゲストが読める未読データ
    pending: VecDeque<u8>,
    /// 受け取った全データ
    written: Vec<u8>,
    log: Vec<CallRecord>,
}

/// エコー型の疑似ホスト
#[derive(Debug, Default)]
pub struct LoopbackHost {
    state: Mutex<HostState>,
}

impl LoopbackHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最初の `n` 回の block プローブに busy を返す
    pub fn with_busy_probes(self, n: u32) -> Self {
        self.lock().busy_probes = n;
        self
    }

    /// 1 回のデータ呼び出しで処理する最大バイト数
    pub fn with_max_chunk(self, max: usize) -> Self {
        self.lock().max_chunk = Some(max);
        self
    }

    /// 次の read/write 呼び出しの戻り値を順に指定する
    pub fn script<I: IntoIterator<Item = i32>>(&self, values: I) {
        self.lock().scripted.extend(values);
    }

    /// ゲストが read で受け取るデータを積む
    pub fn feed(&self, data: &[u8]) {
        self.lock().pending.extend(data.iter().copied());
    }

    /// ホストが write で受け取った全データ
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.lock().log.clone()
    }

    /// 指定オペレーションの呼び出しのみ
    pub fn data_calls(&self, call: GraphicsCall) -> Vec<CallRecord> {
        self.lock().log.iter().filter(|c| c.call == call).cloned().collect()
    }

    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HostState> {
        // テストで panic したスレッドがあっても記録は読めるようにする
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl HostState {
    fn write(&mut self, address: u64, len: u64) -> i32 {
        let accept = match self.scripted.pop_front() {
            Some(ret) if ret < 0 || ret as u64 > len => return ret,
            Some(ret) => ret as usize,
            None => self.limit(len as usize),
        };
        // SAFETY: address..address+len はゲストがトラップ中に貸している送信元スライス
        let bytes = unsafe { guest_bytes(address, accept as u64) };
        self.written.extend_from_slice(bytes);
        self.pending.extend(bytes.iter().copied());
        accept as i32
    }

    fn read(&mut self, address: u64, len: u64) -> i32 {
        let give = match self.scripted.pop_front() {
            Some(ret) if ret < 0 || ret as u64 > len => return ret,
            Some(ret) => (ret as usize).min(self.pending.len()),
            None => self.limit(len as usize).min(self.pending.len()),
        };
        // SAFETY: address..address+len はゲストがトラップ中に貸している受信先スライス
        let dest = unsafe { guest_bytes_mut(address, give as u64) };
        for (slot, byte) in dest.iter_mut().zip(self.pending.drain(..give)) {
            *slot = byte;
        }
        give as i32
    }

    fn limit(&self, len: usize) -> usize {
        self.max_chunk.map_or(len, |max| len.min(max))
    }
}

impl Trap for LoopbackHost {
    fn trap(&self, call: GraphicsCall, request: &GpuSyscall) {
        // SAFETY: request は Marshaler が構築し、トラップ中は生存している
        let (address, len) = unsafe { request.data_args() }.unwrap_or((0, 0));
        let mut state = self.lock();

        let ret = match call {
            GraphicsCall::Block => {
                if state.busy_probes > 0 {
                    state.busy_probes -= 1;
                    1
                } else {
                    0
                }
            }
            GraphicsCall::Write => state.write(address, len),
            GraphicsCall::Read => state.read(address, len),
            _ => 0,
        };

        state.log.push(CallRecord {
            call,
            unique_id: request.unique_id,
            pid: request.pid,
            tid: request.tid,
            address,
            len,
            ret,
        });
        drop(state);

        // SAFETY: ret_ptr は Request が所有する戻り値スロット
        unsafe { request.write_return(ret) };
    }
}
