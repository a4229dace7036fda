//! ページ単位のチャンク転送
//!
//! 1 回の論理転送（read/write）をページサイズごとのチャンクに分割してトラップを発行する。
//!
//! ```text
//! buf ──┬───────────┬───────────┬──────┐
//!       │  chunk 0  │  chunk 1  │ ch 2 │   各チャンク ≤ page_size
//!       └───────────┴───────────┴──────┘
//!
//! 各チャンク:
//!   1. 先頭バイトをタッチ（read: 0 を書く / write: 読む）
//!   2. 末尾バイトをタッチ
//!   3. trap(op, [chunk_addr][chunk_len]) → 処理バイト数
//!   4. 先頭・末尾を読み直す
//! ```
//!
//! ## 結果の集計
//!
//! - 負値: 即座に `TransportFault`（後続チャンクの成功で隠さない）
//! - チャンク長を超える値: `TransportFault`
//! - チャンク長未満（1 以上）: そこで打ち切り、それまでの合計を返す。
//!   呼び出し側は正確なオフセットから再開できる。
//! - 空でないチャンクへの 0: write では `PrematureChannelClose`（先行チャンクの
//!   進捗があっても隠さない）。read では打ち切りと同じ扱い。

use m5pipe_abi::{ArgPack, GraphicsCall};
use m5pipe_trap::{Marshaler, Trap};

use crate::error::StreamError;
use crate::gate::{wait_for_admission, GatePolicy};
use crate::stats::StreamStats;
use crate::touch::{PageToucher, VolatileToucher};

/// チャンク結果の判定
enum Step {
    Continue,
    Stop,
    /// 空でないチャンクに対してホストが 0 を返した
    Eof,
}

fn account(call: GraphicsCall, chunk_len: usize, ret: i32, total: &mut usize) -> Result<Step, StreamError> {
    if ret < 0 {
        return Err(StreamError::TransportFault { call, code: ret });
    }
    let moved = ret as usize;
    if moved > chunk_len {
        return Err(StreamError::TransportFault { call, code: ret });
    }
    *total += moved;
    if moved == 0 && chunk_len > 0 {
        Ok(Step::Eof)
    } else if moved < chunk_len {
        Ok(Step::Stop)
    } else {
        Ok(Step::Continue)
    }
}

/// ゲート + チャンク転送 + 完了までのリトライ
pub struct Transport<T, P = VolatileToucher> {
    marshaler: Marshaler<T>,
    toucher: P,
    gate: GatePolicy,
    page_size: usize,
    stats: StreamStats,
}

impl<T: Trap, P: PageToucher> Transport<T, P> {
    pub fn new(marshaler: Marshaler<T>, toucher: P, gate: GatePolicy, page_size: usize) -> Self {
        Transport {
            marshaler,
            toucher,
            gate,
            page_size: page_size.max(1),
            stats: StreamStats::default(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn marshaler(&self) -> &Marshaler<T> {
        &self.marshaler
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StreamStats {
        &mut self.stats
    }

    /// ゲート通過を待つ
    fn admit(&mut self) -> Result<(), StreamError> {
        let probes = wait_for_admission(&self.marshaler, &self.gate)?;
        self.stats.gate_probes += probes as u64;
        Ok(())
    }

    /// 1 回の論理書き込み（ゲート 1 回 + チャンク群）
    ///
    /// # 戻り値
    /// ホストが受け取ったバイト数（`data.len()` 以下）。`data` が空でなければ 1 以上
    ///
    /// # エラー
    /// - `PrematureChannelClose`: 空でないチャンクに 0 が返った（`sent` はこの呼び出し内の進捗）
    pub fn send(&mut self, data: &[u8]) -> Result<usize, StreamError> {
        self.admit()?;
        self.stats.transfers += 1;

        let call = GraphicsCall::Write;
        let mut total = 0usize;

        if data.is_empty() {
            let ret = self.marshaler.data_call(call, data.as_ptr() as usize as u64, 0);
            account(call, 0, ret, &mut total)?;
            return Ok(total);
        }

        for start in (0..data.len()).step_by(self.page_size) {
            let end = (start + self.page_size).min(data.len());
            let chunk = &data[start..end];
            let last = chunk.len() - 1;

            self.toucher.touch_readable(&chunk[0]);
            self.toucher.touch_readable(&chunk[last]);

            let ret = self
                .marshaler
                .data_call(call, chunk.as_ptr() as usize as u64, chunk.len() as u64);
            self.stats.chunk_calls += 1;

            self.toucher.touch_readable(&chunk[0]);
            self.toucher.touch_readable(&chunk[last]);

            match account(call, chunk.len(), ret, &mut total)? {
                Step::Continue => {}
                Step::Stop => {
                    log::trace!("write chunk at {} short: {} of {}", start, ret, chunk.len());
                    break;
                }
                Step::Eof => {
                    self.stats.bytes_written += total as u64;
                    log::warn!("host accepted 0 bytes of write chunk at {}", start);
                    return Err(StreamError::PrematureChannelClose {
                        sent: total,
                        remaining: data.len() - total,
                    });
                }
            }
        }

        self.stats.bytes_written += total as u64;
        Ok(total)
    }

    /// 1 回の論理読み出し（ゲート 1 回 + チャンク群）
    ///
    /// # 戻り値
    /// ホストが書き込んだバイト数（`buf.len()` 以下）
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize, StreamError> {
        self.admit()?;
        self.stats.transfers += 1;

        let call = GraphicsCall::Read;
        let mut total = 0usize;

        if buf.is_empty() {
            let ret = self.marshaler.data_call(call, buf.as_mut_ptr() as usize as u64, 0);
            account(call, 0, ret, &mut total)?;
            return Ok(total);
        }

        let len = buf.len();
        for start in (0..len).step_by(self.page_size) {
            let end = (start + self.page_size).min(len);
            let chunk = &mut buf[start..end];
            let chunk_len = chunk.len();
            let last = chunk_len - 1;

            self.toucher.touch_writable(&mut chunk[0]);
            self.toucher.touch_writable(&mut chunk[last]);

            let ret = self
                .marshaler
                .data_call(call, chunk.as_mut_ptr() as usize as u64, chunk_len as u64);
            self.stats.chunk_calls += 1;

            self.toucher.touch_readable(&chunk[0]);
            self.toucher.touch_readable(&chunk[last]);

            match account(call, chunk_len, ret, &mut total)? {
                Step::Continue => {}
                Step::Stop | Step::Eof => {
                    log::trace!("read chunk at {} short: {} of {}", start, ret, chunk_len);
                    break;
                }
            }
        }

        self.stats.bytes_read += total as u64;
        Ok(total)
    }

    /// チャンク化しない呼び出し（debug, graphics_mem など）
    pub fn control(&mut self, call: GraphicsCall, args: ArgPack) -> Result<i32, StreamError> {
        if call.needs_page_touch() {
            return Err(StreamError::InvalidArgument(format!(
                "{} must go through the chunked transfer",
                call
            )));
        }
        self.admit()?;
        self.stats.control_calls += 1;
        Ok(self.marshaler.call(call, args))
    }

    /// 全バイトを送り切るまで送信を繰り返す
    ///
    /// # エラー
    /// - `PrematureChannelClose`: 残りがあるのに 0 バイトしか進まなかった
    /// - `TransportFault` / `GateExhausted`: 下位層から
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), StreamError> {
        let len = data.len();
        let mut remaining = len;
        while remaining > 0 {
            let offset = len - remaining;
            let sent = self.send(&data[offset..]).map_err(|err| match err {
                StreamError::PrematureChannelClose { sent, remaining } => {
                    StreamError::PrematureChannelClose { sent: offset + sent, remaining }
                }
                other => other,
            })?;
            remaining -= sent;
        }
        Ok(())
    }

    /// バッファが埋まるまで受信を繰り返す
    ///
    /// # エラー
    /// - `ChannelClosed`: 残りがあるのに 0 バイトしか進まなかった（回復可能）
    /// - `TransportFault` / `GateExhausted`: 下位層から
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), StreamError> {
        let len = buf.len();
        let mut remaining = len;
        while remaining > 0 {
            let received = self.recv(&mut buf[len - remaining..])?;
            if received == 0 {
                return Err(StreamError::ChannelClosed { received: len - remaining, remaining });
            }
            remaining -= received;
        }
        Ok(())
    }
}
