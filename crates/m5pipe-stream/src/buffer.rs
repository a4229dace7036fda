//! ストリームが所有する送信バッファ

use crate::error::StreamError;

/// 再利用される送信バッファ
///
/// 要求サイズが現在の容量以下なら同じ領域を返す。足りなければ拡張し、
/// 拡張に失敗したら古い領域も解放して容量を 0 に戻す。縮小はしない。
/// 内容の保持は保証しない（スクラッチ領域）。
#[derive(Debug)]
pub struct SendBuffer {
    buf: Option<Vec<u8>>,
    /// 現在の容量。未確保の間は既定サイズ
    capacity: usize,
    /// 確保できる最大サイズ（None = 無制限）
    limit: Option<usize>,
}

impl SendBuffer {
    pub fn new(default_size: usize, limit: Option<usize>) -> Self {
        SendBuffer {
            buf: None,
            capacity: default_size,
            limit,
        }
    }

    /// `min_size` バイト以上のバッファを返す
    ///
    /// 返すスライスの長さは現在の容量（`min_size` 以上）。
    pub fn acquire(&mut self, min_size: usize) -> Result<&mut [u8], StreamError> {
        let alloc_size = self.capacity.max(min_size);

        match self.buf.take() {
            None => {
                log::debug!("allocating send buffer of {} bytes", alloc_size);
                let buf = self.allocate(alloc_size)?;
                self.capacity = alloc_size;
                self.buf = Some(buf);
            }
            Some(buf) if buf.len() < alloc_size => {
                log::debug!("growing send buffer {} -> {} bytes", buf.len(), alloc_size);
                match self.grow(buf, alloc_size) {
                    Ok(buf) => {
                        self.capacity = alloc_size;
                        self.buf = Some(buf);
                    }
                    Err(err) => {
                        // 古い領域は grow 内で解放済み
                        self.capacity = 0;
                        return Err(err);
                    }
                }
            }
            Some(buf) => self.buf = Some(buf),
        }

        self.buf
            .as_deref_mut()
            .ok_or(StreamError::BufferAllocationFailed { requested: alloc_size })
    }

    /// 確保済みのバッファ（未確保なら None）
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.buf.as_deref()
    }

    pub fn as_mut_slice(&mut self) -> Option<&mut [u8]> {
        self.buf.as_deref_mut()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_allocated(&self) -> bool {
        self.buf.is_some()
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>, StreamError> {
        self.check_limit(size)?;
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| StreamError::BufferAllocationFailed { requested: size })?;
        buf.resize(size, 0);
        Ok(buf)
    }

    fn grow(&self, mut buf: Vec<u8>, size: usize) -> Result<Vec<u8>, StreamError> {
        self.check_limit(size)?;
        buf.try_reserve_exact(size - buf.len())
            .map_err(|_| StreamError::BufferAllocationFailed { requested: size })?;
        buf.resize(size, 0);
        Ok(buf)
    }

    fn check_limit(&self, size: usize) -> Result<(), StreamError> {
        match self.limit {
            Some(max) if size > max => Err(StreamError::BufferAllocationFailed { requested: size }),
            _ => Ok(()),
        }
    }
}
