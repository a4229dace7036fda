//! トラップリクエストの構造体と引数パッキング
//!
//! ## メモリレイアウト
//! ```text
//! GpuSyscall (56 bytes, #[repr(C)])
//!   +0  unique_id        u64
//!   +8  pid              i32
//!   +12 tid              i32
//!   +16 total_bytes      u64   = sum(arg_lengths)
//!   +24 num_args         u64
//!   +32 arg_lengths_ptr  u64 → [u64; num_args]
//!   +40 args_ptr         u64 → [u8; total_bytes]  (引数を順に連結)
//!   +48 ret_ptr          u64 → i32                (ホストが結果を書く)
//! ```
//!
//! ポインタはすべて u64 に格納する（32bit ゲストでもレイアウトは同一）。

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;

use crate::error::AbiError;

/// ホストに渡すリクエストヘッダー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct GpuSyscall {
    pub unique_id: u64,
    pub pid: i32,
    pub tid: i32,
    pub total_bytes: u64,
    pub num_args: u64,
    pub arg_lengths_ptr: u64,
    pub args_ptr: u64,
    pub ret_ptr: u64,
}

impl GpuSyscall {
    /// 構造体サイズ（ABI 固定）
    pub const SIZE: usize = 56;

    /// 引数長の配列を返す（ホスト側の読み出し）
    ///
    /// # Safety
    /// `arg_lengths_ptr` が `num_args` 個の u64 を指す有効なアドレスであること。
    /// [`Request`] が生成したヘッダーで、その `Request` が生存している間は満たされる。
    pub unsafe fn arg_lengths(&self) -> &[u64] {
        if self.num_args == 0 {
            return &[];
        }
        core::slice::from_raw_parts(self.arg_lengths_ptr as usize as *const u64, self.num_args as usize)
    }

    /// 連結された引数バイト列を返す
    ///
    /// # Safety
    /// [`GpuSyscall::arg_lengths`] と同じ条件に加え、`args_ptr` が `total_bytes`
    /// バイトの有効な領域を指すこと。
    pub unsafe fn args_bytes(&self) -> &[u8] {
        if self.total_bytes == 0 {
            return &[];
        }
        core::slice::from_raw_parts(self.args_ptr as usize as *const u8, self.total_bytes as usize)
    }

    /// `index` 番目の引数のバイト列
    ///
    /// # Safety
    /// [`GpuSyscall::args_bytes`] と同じ。
    pub unsafe fn arg(&self, index: usize) -> Result<&[u8], AbiError> {
        let lengths = self.arg_lengths();
        if index >= lengths.len() {
            return Err(AbiError::ArgumentOutOfRange { index, num_args: self.num_args });
        }
        let start: u64 = lengths[..index].iter().sum();
        let bytes = self.args_bytes();
        let start = start as usize;
        let end = start + lengths[index] as usize;
        Ok(&bytes[start..end])
    }

    /// `index` 番目の引数を u64（ネイティブエンディアン）として読む
    ///
    /// # Safety
    /// [`GpuSyscall::args_bytes`] と同じ。
    pub unsafe fn arg_u64(&self, index: usize) -> Result<u64, AbiError> {
        let bytes = self.arg(index)?;
        let word: [u8; 8] = bytes.try_into().map_err(|_| AbiError::ArgumentLength {
            expected: 8,
            actual: bytes.len() as u64,
        })?;
        Ok(u64::from_ne_bytes(word))
    }

    /// データ系呼び出しの (アドレス, 長さ) を取り出す
    ///
    /// # Safety
    /// [`GpuSyscall::args_bytes`] と同じ。
    pub unsafe fn data_args(&self) -> Result<(u64, u64), AbiError> {
        Ok((self.arg_u64(0)?, self.arg_u64(1)?))
    }

    /// 戻り値スロットに結果を書き込む（ホスト側）
    ///
    /// # Safety
    /// `ret_ptr` が書き込み可能な i32 を指すこと。
    pub unsafe fn write_return(&self, value: i32) {
        core::ptr::write_volatile(self.ret_ptr as usize as *mut i32, value);
    }
}

/// 引数リストのパッカー
///
/// 各引数の長さを `lengths` に、生バイトを `bytes` の末尾に連結する。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgPack {
    lengths: Vec<u64>,
    bytes: Vec<u8>,
}

impl ArgPack {
    pub fn new() -> Self {
        Self::default()
    }

    /// データ系呼び出しの標準引数 `[address: u64][length: u64]` を組み立てる
    pub fn data(address: u64, len: u64) -> Self {
        let mut pack = ArgPack {
            lengths: Vec::with_capacity(2),
            bytes: Vec::with_capacity(16),
        };
        pack.push_u64(address);
        pack.push_u64(len);
        pack
    }

    /// 任意のバイト列を 1 引数として追加する
    pub fn push(&mut self, arg: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(arg);
        self.lengths.push(arg.len() as u64);
        self
    }

    /// u64 をネイティブエンディアンで 1 引数として追加する
    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.push(&value.to_ne_bytes())
    }

    pub fn num_args(&self) -> u64 {
        self.lengths.len() as u64
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn lengths(&self) -> &[u64] {
        &self.lengths
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// 1 回のトラップ呼び出し分のリクエスト
///
/// ヘッダーが指す長さ配列・引数バイト列・戻り値スロットを所有する。
/// ヒープ上のバッファを指すため、`Request` をムーブしてもヘッダーのアドレスは有効。
/// 引数は構築後に変更できない。
pub struct Request {
    header: GpuSyscall,
    args: ArgPack,
    ret: Box<UnsafeCell<i32>>,
}

impl Request {
    /// リクエストを構築し、ヘッダーのアドレス欄を埋める
    pub fn new(unique_id: u64, pid: i32, tid: i32, args: ArgPack) -> Self {
        let ret = Box::new(UnsafeCell::new(0i32));
        let header = GpuSyscall {
            unique_id,
            pid,
            tid,
            total_bytes: args.total_bytes(),
            num_args: args.num_args(),
            arg_lengths_ptr: args.lengths.as_ptr() as usize as u64,
            args_ptr: args.bytes.as_ptr() as usize as u64,
            ret_ptr: ret.get() as usize as u64,
        };
        Request { header, args, ret }
    }

    /// トラップに渡すヘッダー
    pub fn header(&self) -> &GpuSyscall {
        &self.header
    }

    pub fn args(&self) -> &ArgPack {
        &self.args
    }

    /// ホストが書き込んだ戻り値を読む
    pub fn return_value(&self) -> i32 {
        // SAFETY: ret は Request が所有する有効な i32。ホストの書き込みは
        // トラップ呼び出し中に完了している。
        unsafe { core::ptr::read_volatile(self.ret.get()) }
    }
}

impl core::fmt::Debug for Request {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Request")
            .field("header", &self.header)
            .field("return_value", &self.return_value())
            .finish()
    }
}

/// ホストがゲストメモリを読むためのヘルパー
///
/// # Safety
/// `address..address+len` がこのプロセス内の読み出し可能な領域であること。
pub unsafe fn guest_bytes<'a>(address: u64, len: u64) -> &'a [u8] {
    if len == 0 {
        return &[];
    }
    core::slice::from_raw_parts(address as usize as *const u8, len as usize)
}

/// ホストがゲストメモリに書き込むためのヘルパー
///
/// # Safety
/// `address..address+len` がこのプロセス内の書き込み可能な領域で、
/// 呼び出し中に他の参照からアクセスされないこと。
pub unsafe fn guest_bytes_mut<'a>(address: u64, len: u64) -> &'a mut [u8] {
    if len == 0 {
        return &mut [];
    }
    core::slice::from_raw_parts_mut(address as usize as *mut u8, len as usize)
}
