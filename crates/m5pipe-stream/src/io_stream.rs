//! バックエンドに依存しないストリームインターフェース
//!
//! 上位のコマンドエンコーダはこのトレイトだけを見る。戻り値の規約:
//!
//! | 操作 | 成功 | 回復可能な失敗 | 致命的な失敗 |
//! |------|------|----------------|--------------|
//! | `alloc_buffer` | `Some(buf)` | `None` | - |
//! | `commit_buffer` / `write_fully` | `0` | - | プロセス終了 |
//! | `read_fully` | `Some(data)` | `None` | プロセス終了 |
//! | `read` | `Some(data)` | `None` | - |

use m5pipe_trap::Trap;

use crate::error::StreamError;
use crate::stream::PipeStream;
use crate::touch::PageToucher;

/// ブロッキングなバイトストリーム
pub trait IoStream {
    /// `min_size` バイト以上の送信バッファを返す。失敗したら None
    fn alloc_buffer(&mut self, min_size: usize) -> Option<&mut [u8]>;

    /// 送信バッファの先頭 `size` バイトを送る。成功したら 0
    fn commit_buffer(&mut self, size: usize) -> i32;

    /// `buf` の先頭 `len` バイトを送り切る。成功したら 0
    fn write_fully(&mut self, buf: Option<&[u8]>, len: usize) -> i32;

    /// `buf` の先頭 `len` バイトを埋めるまで受信する
    fn read_fully<'a>(&mut self, buf: Option<&'a mut [u8]>, len: usize) -> Option<&'a [u8]>;

    /// 最大 `*len` バイトを 1 回だけ受信し、`*len` を受信バイト数に書き換える
    fn read<'a>(&mut self, buf: Option<&'a mut [u8]>, len: &mut usize) -> Option<&'a [u8]>;
}

impl<T: Trap, P: PageToucher> PipeStream<T, P> {
    /// 致命的なら方針に従って終了する
    fn check(&self, operation: &str, err: &StreamError) {
        if err.is_fatal() {
            self.config().fatal_policy.escalate(operation, err);
        }
        log::warn!("{} failed: {}", operation, err);
    }
}

impl<T: Trap, P: PageToucher> IoStream for PipeStream<T, P> {
    fn alloc_buffer(&mut self, min_size: usize) -> Option<&mut [u8]> {
        self.try_allocate(min_size).ok()
    }

    fn commit_buffer(&mut self, size: usize) -> i32 {
        match self.try_commit(size) {
            Ok(()) => 0,
            Err(err) => {
                self.check("commit_buffer", &err);
                -1
            }
        }
    }

    fn write_fully(&mut self, buf: Option<&[u8]>, len: usize) -> i32 {
        match self.try_write_fully(buf, len) {
            Ok(()) => 0,
            Err(err) => {
                self.check("write_fully", &err);
                -1
            }
        }
    }

    fn read_fully<'a>(&mut self, buf: Option<&'a mut [u8]>, len: usize) -> Option<&'a [u8]> {
        match self.try_read_fully(buf, len) {
            Ok(data) => data,
            Err(err) => {
                self.check("read_fully", &err);
                None
            }
        }
    }

    fn read<'a>(&mut self, buf: Option<&'a mut [u8]>, len: &mut usize) -> Option<&'a [u8]> {
        match self.try_read(buf, len) {
            Ok(data) => data,
            Err(err) => {
                log::debug!("read: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::fatal::FatalPolicy;
    use crate::gate::GatePolicy;
    use crate::loopback::LoopbackHost;
    use m5pipe_abi::{DebugCall, GraphicsCall};
    use m5pipe_trap::ProcessContext;
    use std::sync::Arc;
    use std::time::Duration;

    fn config() -> StreamConfig {
        StreamConfig::default()
            .with_page_size(4096)
            .with_gate(GatePolicy::unbounded(Duration::ZERO))
            .with_fatal_policy(FatalPolicy::Panic)
    }

    fn open(host: &LoopbackHost) -> PipeStream<&LoopbackHost> {
        PipeStream::with_context(host, Arc::new(ProcessContext::with_pid(7)), config())
    }

    #[test]
    fn test_allocate_reuses_buffer() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);

        let first = stream.alloc_buffer(100).unwrap().as_ptr();
        let second = stream.alloc_buffer(50).unwrap().as_ptr();
        assert_eq!(first, second);
        assert_eq!(stream.capacity(), 10000);
        // 確保だけではトラップを発行しない
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_allocate_grow_failure() {
        let host = LoopbackHost::new();
        let mut stream = PipeStream::with_context(
            &host,
            Arc::new(ProcessContext::with_pid(7)),
            config().with_buffer_size(100).with_max_buffer_size(1000),
        );

        assert_eq!(stream.alloc_buffer(10).unwrap().len(), 100);
        assert!(stream.alloc_buffer(5000).is_none());
        assert_eq!(stream.capacity(), 0);
        assert_eq!(stream.stats().alloc_failures, 1);

        // 次の確保は要求サイズちょうど
        assert_eq!(stream.alloc_buffer(20).unwrap().len(), 20);
    }

    #[test]
    fn test_commit_sends_prefix() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);

        let buf = stream.alloc_buffer(500).unwrap();
        for (i, b) in buf.iter_mut().take(500).enumerate() {
            *b = i as u8;
        }
        assert_eq!(stream.commit_buffer(500), 0);

        let writes = host.data_calls(GraphicsCall::Write);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].len, 500);
        let expected: Vec<u8> = (0..500).map(|i| i as u8).collect();
        assert_eq!(host.written(), expected);
        assert_eq!(host.data_calls(GraphicsCall::Block).len(), 1);
    }

    #[test]
    fn test_commit_zero_is_noop() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        assert_eq!(stream.commit_buffer(0), 0);
        assert!(host.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "commit_buffer failed")]
    fn test_commit_beyond_capacity_is_fatal() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        stream.alloc_buffer(10).unwrap();
        stream.commit_buffer(20000);
    }

    #[test]
    fn test_write_fully_zero_len_touches_nothing() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        assert_eq!(stream.write_fully(None, 0), 0);
        assert_eq!(stream.write_fully(Some(b"abc"), 0), 0);
        assert!(host.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "write_fully failed: invalid argument")]
    fn test_write_fully_null_buffer_is_fatal() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        stream.write_fully(None, 16);
    }

    #[test]
    fn test_write_fully_partial_progress() {
        let host = LoopbackHost::new().with_max_chunk(3);
        let mut stream = open(&host);
        let data: Vec<u8> = (0..10u8).collect();

        assert_eq!(stream.write_fully(Some(&data), 10), 0);
        let lens: Vec<u64> = host.data_calls(GraphicsCall::Write).iter().map(|c| c.len).collect();
        assert_eq!(lens, vec![10, 7, 4, 1]);
        assert_eq!(host.written(), data);
    }

    #[test]
    fn test_write_fully_waits_for_gate() {
        let host = LoopbackHost::new().with_busy_probes(3);
        let mut stream = open(&host);

        assert_eq!(stream.write_fully(Some(b"ping"), 4), 0);
        let calls: Vec<GraphicsCall> = host.calls().iter().map(|c| c.call).collect();
        assert_eq!(
            calls,
            vec![
                GraphicsCall::Block,
                GraphicsCall::Block,
                GraphicsCall::Block,
                GraphicsCall::Block,
                GraphicsCall::Write,
            ]
        );
        assert_eq!(stream.stats().gate_probes, 4);
    }

    #[test]
    #[should_panic(expected = "write_fully failed: premature EOF")]
    fn test_write_fully_zero_progress_is_fatal() {
        let host = LoopbackHost::new();
        host.script([4, 0]);
        let mut stream = open(&host);
        stream.write_fully(Some(&[0u8; 10]), 10);
    }

    #[test]
    #[should_panic(expected = "transport fault")]
    fn test_write_fully_negative_chunk_is_fatal() {
        let host = LoopbackHost::new();
        host.script([-1]);
        let mut stream = open(&host);
        stream.write_fully(Some(&[0u8; 10]), 10);
    }

    #[test]
    fn test_read_fully_echo() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        assert_eq!(stream.write_fully(Some(b"hello world"), 11), 0);

        let mut buf = [0u8; 11];
        let data = stream.read_fully(Some(&mut buf), 11).unwrap();
        assert_eq!(data, b"hello world");
        assert_eq!(stream.stats().bytes_read, 11);
    }

    #[test]
    fn test_read_fully_null_zero_len() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        assert!(stream.read_fully(None, 0).is_none());
        assert!(host.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "read_fully failed: invalid argument")]
    fn test_read_fully_null_buffer_is_fatal() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        stream.read_fully(None, 8);
    }

    #[test]
    fn test_read_fully_closed_channel_is_recoverable() {
        let host = LoopbackHost::new();
        host.feed(b"abc");
        let mut stream = open(&host);

        let mut buf = [0u8; 8];
        assert!(stream.read_fully(Some(&mut buf), 8).is_none());
        assert_eq!(&buf[..3], b"abc");
    }

    #[test]
    fn test_read_rewrites_len() {
        let host = LoopbackHost::new();
        host.feed(b"xyz");
        let mut stream = open(&host);

        let mut buf = [0u8; 16];
        let mut len = 16;
        let data = stream.read(Some(&mut buf), &mut len).unwrap();
        assert_eq!(data, b"xyz");
        assert_eq!(len, 3);
    }

    #[test]
    fn test_read_failures_return_none() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);

        // 未読データなし
        let mut buf = [0u8; 4];
        let mut len = 4;
        assert!(stream.read(Some(&mut buf), &mut len).is_none());
        assert_eq!(len, 4);

        // ホストのエラーも致命的にはしない
        host.script([-3]);
        assert!(stream.read(Some(&mut buf), &mut len).is_none());

        assert!(stream.read(None, &mut len).is_none());
    }

    #[test]
    fn test_read_zero_len_touches_nothing() {
        let host = LoopbackHost::new();
        host.feed(b"abc");
        let mut stream = open(&host);

        let mut buf = [0u8; 4];
        let mut len = 0;
        assert!(stream.read(Some(&mut buf), &mut len).is_none());
        assert_eq!(len, 0);

        let mut empty: [u8; 0] = [];
        let mut len = 4;
        assert!(stream.read(Some(&mut empty), &mut len).is_none());
        assert!(host.calls().is_empty());
    }

    #[test]
    #[should_panic(expected = "write_fully failed: premature EOF")]
    fn test_write_fully_zero_after_progress_is_fatal() {
        let host = LoopbackHost::new();
        host.script([16, 0]);
        let mut stream = PipeStream::with_context(
            &host,
            Arc::new(ProcessContext::with_pid(7)),
            config().with_page_size(16),
        );
        stream.write_fully(Some(&[0u8; 48]), 48);
    }

    #[test]
    fn test_unique_ids_increase_across_streams() {
        let host = LoopbackHost::new();
        let context = Arc::new(ProcessContext::with_pid(7));
        let mut a = PipeStream::with_context(&host, context.clone(), config());
        let mut b = PipeStream::with_context(&host, context.clone(), config());

        a.write_fully(Some(b"a"), 1);
        b.write_fully(Some(b"b"), 1);
        a.write_fully(Some(b"c"), 1);

        let ids: Vec<u64> = host.calls().iter().map(|c| c.unique_id).collect();
        assert_eq!(ids, (1..=6).collect::<Vec<u64>>());
        assert!(host.calls().iter().all(|c| c.pid == 7));
        assert_eq!(context.last_unique_id(), 6);
    }

    #[test]
    fn test_debug_host_notifications() {
        let host = LoopbackHost::new();
        let mut stream = PipeStream::with_context(
            &host,
            Arc::new(ProcessContext::with_pid(7)),
            config().with_buffer_size(64).with_max_buffer_size(128).with_debug_host(true),
        );

        let info = host.data_calls(GraphicsCall::Debug);
        assert!(!info.is_empty());
        assert!(info.iter().all(|c| c.address == DebugCall::Info.code()));
        assert_eq!(info.last().unwrap().len, 4096);
        host.clear_log();

        stream.alloc_buffer(10).unwrap();
        let alloc = host.data_calls(GraphicsCall::Debug);
        assert_eq!(alloc.len(), 1);
        assert_eq!((alloc[0].address, alloc[0].len), (DebugCall::PipeMemAlloc.code(), 64));
        host.clear_log();

        // 容量が変わらなければ通知しない
        stream.alloc_buffer(10).unwrap();
        assert!(host.data_calls(GraphicsCall::Debug).is_empty());

        assert!(stream.alloc_buffer(1000).is_none());
        let fail = host.data_calls(GraphicsCall::Debug);
        assert_eq!(fail.len(), 1);
        assert_eq!(fail[0].address, DebugCall::PipeMemAllocFail.code());
    }

    #[test]
    fn test_stats_json() {
        let host = LoopbackHost::new();
        let mut stream = open(&host);
        stream.alloc_buffer(8).unwrap();
        stream.write_fully(Some(b"12345678"), 8);

        let value: serde_json::Value = serde_json::from_str(&stream.stats().to_json()).unwrap();
        assert_eq!(value["bytes_written"], 8);
        assert_eq!(value["buffer_capacity"], 10000);
        assert_eq!(value["transfers"], 1);
    }
}
