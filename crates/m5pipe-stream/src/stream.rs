//! ブロッキングストリーム本体

use std::sync::Arc;

use m5pipe_abi::{ArgPack, DebugCall, GraphicsCall};
use m5pipe_trap::{Marshaler, ProcessContext, Trap};

use crate::buffer::SendBuffer;
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::platform;
use crate::stats::StreamStats;
use crate::touch::{PageToucher, VolatileToucher};
use crate::transfer::Transport;

/// トラップ経由のブロッキングストリーム
///
/// 1 つの描画コンテキスト（スレッド）につき 1 インスタンス。送信バッファを所有し、
/// 他のストリームとは共有しない。操作はすべて呼び出しスレッドでブロックする。
///
/// ## 状態遷移（書き込み）
///
/// ```text
/// Start → Gate → Transfer ─┬─ 全バイト送信        → Ok
///                          ├─ 残りあり & 0 バイト → PrematureChannelClose (fatal)
///                          └─ 負値              → TransportFault (fatal)
/// ```
///
/// `try_*` 系は致命的エラーも `Err` で返す。プロセス終了まで含めた振る舞いは
/// [`crate::IoStream`] 実装を使うこと。
pub struct PipeStream<T, P = VolatileToucher> {
    buffer: SendBuffer,
    transport: Transport<T, P>,
    config: StreamConfig,
}

impl<T: Trap> PipeStream<T> {
    /// プロセス共有のコンテキストでストリームを開く
    pub fn new(trap: T, config: StreamConfig) -> Self {
        Self::with_context(trap, ProcessContext::global(), config)
    }

    pub fn with_context(trap: T, context: Arc<ProcessContext>, config: StreamConfig) -> Self {
        Self::with_toucher(trap, context, VolatileToucher, config)
    }
}

impl<T: Trap, P: PageToucher> PipeStream<T, P> {
    pub fn with_toucher(trap: T, context: Arc<ProcessContext>, toucher: P, config: StreamConfig) -> Self {
        let page_size = config.page_size.unwrap_or_else(platform::page_size);
        log::debug!(
            ">> PipeStream::new buffer_size={} page_size={}",
            config.buffer_size,
            page_size
        );

        let transport = Transport::new(
            Marshaler::new(trap, context),
            toucher,
            config.gate_policy(),
            page_size,
        );
        let mut stream = PipeStream {
            buffer: SendBuffer::new(config.buffer_size, config.max_buffer_size),
            transport,
            config,
        };

        if stream.config.debug_host {
            if let Some((soft, hard)) = platform::memlock_limit() {
                stream.notify_host(DebugCall::Info, soft);
                stream.notify_host(DebugCall::Info, hard);
            }
            stream.notify_host(DebugCall::Info, page_size as u64);
        }
        stream
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.transport.page_size()
    }

    /// 送信バッファの現在の容量
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn stats(&self) -> StreamStats {
        StreamStats {
            buffer_capacity: self.buffer.capacity(),
            ..self.transport.stats().clone()
        }
    }

    /// `min_size` バイト以上の送信バッファを返す
    ///
    /// # エラー
    /// - `BufferAllocationFailed`: 確保・拡張に失敗（古いバッファも解放済み）
    pub fn try_allocate(&mut self, min_size: usize) -> Result<&mut [u8], StreamError> {
        log::debug!(">> PipeStream::allocate {}", min_size);
        let before = self.buffer.capacity();
        let was_allocated = self.buffer.is_allocated();

        if let Err(err) = self.buffer.acquire(min_size).map(|_| ()) {
            log::error!("send buffer allocation ({} bytes) failed", min_size.max(before));
            self.transport.stats_mut().alloc_failures += 1;
            if self.config.debug_host {
                self.notify_host(DebugCall::PipeMemAllocFail, 0);
            }
            return Err(err);
        }

        if self.config.debug_host && (!was_allocated || self.buffer.capacity() != before) {
            self.notify_host(DebugCall::PipeMemAlloc, self.buffer.capacity() as u64);
        }

        self.buffer
            .as_mut_slice()
            .ok_or(StreamError::BufferAllocationFailed { requested: min_size })
    }

    /// 送信バッファの先頭 `size` バイトを送る
    pub fn try_commit(&mut self, size: usize) -> Result<(), StreamError> {
        log::debug!(">> PipeStream::commit {}", size);
        if size == 0 {
            return Ok(());
        }
        let data = match self.buffer.as_slice() {
            None => {
                return Err(StreamError::InvalidArgument(format!(
                    "commit of {} bytes without an allocated buffer",
                    size
                )))
            }
            Some(buf) if size > buf.len() => {
                return Err(StreamError::InvalidArgument(format!(
                    "commit of {} bytes exceeds buffer capacity {}",
                    size,
                    buf.len()
                )))
            }
            Some(buf) => &buf[..size],
        };
        self.transport.write_all(data)
    }

    /// `buf` の先頭 `len` バイトを送り切る
    ///
    /// - `len == 0`: 何もしない（ゲートもトラップも発行しない）
    /// - `buf == None && len > 0`: `InvalidArgument`
    pub fn try_write_fully(&mut self, buf: Option<&[u8]>, len: usize) -> Result<(), StreamError> {
        log::debug!(">> PipeStream::write_fully {}", len);
        if len == 0 {
            return Ok(());
        }
        let data = checked_prefix("write_fully", buf, len)?;
        self.transport.write_all(data)?;
        log::debug!("<< PipeStream::write_fully {}", len);
        Ok(())
    }

    /// `buf` の先頭 `len` バイトを埋めるまで受信する
    ///
    /// # 戻り値
    /// - `Ok(None)`: `buf == None && len == 0`
    /// - `Ok(Some(data))`: 受信したデータ（長さ `len`）
    ///
    /// # エラー
    /// - `InvalidArgument`: `buf == None && len > 0` など（fatal）
    /// - `ChannelClosed`: ホストが 0 バイトを返した（回復可能）
    pub fn try_read_fully<'a>(
        &mut self,
        buf: Option<&'a mut [u8]>,
        len: usize,
    ) -> Result<Option<&'a [u8]>, StreamError> {
        log::debug!(">> PipeStream::read_fully {}", len);
        let buf = match buf {
            None if len == 0 => return Ok(None),
            None => {
                return Err(StreamError::InvalidArgument(format!(
                    "read_fully: null buffer with len {}",
                    len
                )))
            }
            Some(buf) if len > buf.len() => {
                return Err(StreamError::InvalidArgument(format!(
                    "read_fully: len {} exceeds buffer of {} bytes",
                    len,
                    buf.len()
                )))
            }
            Some(buf) => &mut buf[..len],
        };

        self.transport.read_exact(buf)?;
        log::debug!("<< PipeStream::read_fully {}", len);
        Ok(Some(buf))
    }

    /// 単発の受信（best effort）
    ///
    /// 成功したら `len` を実際に受け取ったバイト数に書き換える。
    /// 失敗はすべて回復可能なエラーとして返す。
    /// 受信できる長さが 0 なら、ゲートもトラップも発行せずに `Ok(None)` を返す。
    pub fn try_read<'a>(
        &mut self,
        buf: Option<&'a mut [u8]>,
        len: &mut usize,
    ) -> Result<Option<&'a [u8]>, StreamError> {
        log::debug!(">> PipeStream::read {}", *len);
        let Some(buf) = buf else {
            log::warn!("PipeStream::read called with a null buffer");
            return Ok(None);
        };
        let want = (*len).min(buf.len());
        if want == 0 {
            return Ok(None);
        }

        let received = match self.transport.recv(&mut buf[..want]) {
            Ok(n) => n,
            Err(StreamError::TransportFault { code, .. }) => {
                return Err(StreamError::NoProgress { code })
            }
            Err(err) => {
                log::warn!("PipeStream::read: {}", err);
                return Err(StreamError::NoProgress { code: -1 });
            }
        };
        if received == 0 {
            return Err(StreamError::NoProgress { code: 0 });
        }

        *len = received;
        Ok(Some(&buf[..received]))
    }

    /// ホストにデバッグ情報を送る（失敗しても無視する）
    pub fn notify_host(&mut self, code: DebugCall, value: u64) {
        if let Err(err) = self
            .transport
            .control(GraphicsCall::Debug, ArgPack::data(code.code(), value))
        {
            log::warn!("debug notification {:?} failed: {}", code, err);
        }
    }

    /// チャンク化しない任意の呼び出し（graphics_mem, sim_active など）
    pub fn control(&mut self, call: GraphicsCall, args: ArgPack) -> Result<i32, StreamError> {
        self.transport.control(call, args)
    }

    /// 内部トランスポート（テスト・診断用）
    pub fn transport(&self) -> &Transport<T, P> {
        &self.transport
    }
}

/// `buf` の先頭 `len` バイトを取り出す（null / 長さ超過を弾く）
fn checked_prefix<'a>(op: &str, buf: Option<&'a [u8]>, len: usize) -> Result<&'a [u8], StreamError> {
    match buf {
        None => Err(StreamError::InvalidArgument(format!("{}: null buffer with len {}", op, len))),
        Some(buf) if len > buf.len() => Err(StreamError::InvalidArgument(format!(
            "{}: len {} exceeds buffer of {} bytes",
            op,
            len,
            buf.len()
        ))),
        Some(buf) => Ok(&buf[..len]),
    }
}
