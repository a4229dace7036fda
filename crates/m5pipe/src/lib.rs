//! # m5pipe
//!
//! gem5 上のゲストからホストのレンダラへコマンドを流すためのストリーム。
//!
//! ## 使用方法
//!
//! ```no_run
//! use m5pipe::{IoStream, PipeSession, StreamConfig};
//!
//! m5pipe::init_logger();
//!
//! let mut session = PipeSession::open(StreamConfig::default()).unwrap();
//! log::info!("process uid {:#x}", session.process_uid());
//!
//! // エンコーダはバッファに直接書き込み、まとめて送る
//! let stream = session.stream_mut();
//! let buf = stream.alloc_buffer(256).unwrap();
//! buf[..8].copy_from_slice(&[1, 0, 0, 0, 8, 0, 0, 0]);
//! stream.commit_buffer(8);
//!
//! // 応答を待つ
//! let mut reply = [0u8; 4];
//! let _ = stream.read_fully(Some(&mut reply), 4);
//! ```
//!
//! ## 構成
//!
//! ```text
//! m5pipe            PipeSession, init_logger
//!   ├── m5pipe-stream   IoStream / PipeStream / ゲート / チャンク転送
//!   ├── m5pipe-process  puid
//!   ├── m5pipe-trap     Trap / Marshaler / ProcessContext
//!   └── m5pipe-abi      呼び出し番号とリクエストのレイアウト
//! ```

pub mod session;

pub use session::{OpenError, PipeSession};

pub use m5pipe_abi::{DebugCall, GraphicsCall};
pub use m5pipe_process::{process_uid, Backend, ProcessError};
pub use m5pipe_stream::{
    ConfigError, FatalPolicy, GatePolicy, IoStream, PipeStream, StreamConfig, StreamError, StreamStats,
};
#[cfg(feature = "loopback")]
pub use m5pipe_stream::{CallRecord, LoopbackHost};
pub use m5pipe_trap::{M5Trap, ProcessContext, Trap};

/// puid を確定させてから gem5 トラップのストリームを開く
///
/// セッションが不要な呼び出し側向けの短縮形。
pub fn open_stream(config: StreamConfig) -> Result<PipeStream<M5Trap>, OpenError> {
    PipeSession::open(config).map(PipeSession::into_stream)
}

/// `RUST_LOG` に従って env_logger を初期化する（既定は info）
///
/// 2 回目以降の呼び出しは何もしない。
pub fn init_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .try_init();
}
