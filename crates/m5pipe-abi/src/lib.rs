//! # m5pipe-abi
//!
//! ゲスト（Android ゲスト OS 上の GL/CUDA クライアント）とホスト（gem5 シミュレータ）の
//! 間で共有される固定 ABI。
//!
//! ## トラップ呼び出し
//!
//! ```text
//! m5_gpu(operation_code: u64, request_address: u64)
//! ```
//!
//! ホストは `request_address` が指す [`GpuSyscall`] を読み、引数をアドレス経由で参照し、
//! 結果（i32）を `ret_ptr` に書き込んでから制御を返す。
//!
//! ## リクエスト構造体（#[repr(C)], 56 バイト）
//!
//! ```text
//! [unique_id: u64][pid: i32][tid: i32][total_bytes: u64][num_args: u64]
//! [arg_lengths_ptr: u64][args_ptr: u64][ret_ptr: u64]
//! ```
//!
//! 引数はインバンドのフレーミングを持たない。長さ配列（u64 × num_args）と
//! 連結された引数バイト列を、それぞれアドレスで渡す。
//!
//! ## オペレーションコード
//!
//! 値はホスト側 (`cuda_syscalls.h`) と合意済み。**番号の変更は禁止**、追加のみ可。

#![no_std]
extern crate alloc;

pub mod call;
pub mod error;
pub mod request;

pub use call::{DebugCall, GraphicsCall, GPU_CALLS_START};
pub use error::AbiError;
pub use request::{guest_bytes, guest_bytes_mut, ArgPack, GpuSyscall, Request};
