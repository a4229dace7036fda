//! # m5pipe-stream
//!
//! gem5 のトラップ上に構築したブロッキングなコマンドストリーム。
//!
//! ## レイヤー構成
//!
//! ```text
//! IoStream (alloc_buffer / commit_buffer / write_fully / read_fully / read)
//!   └─ PipeStream        送信バッファの所有、引数検査、致命的エラーの処理
//!        └─ Transport    ゲート 1 回 + ページ単位チャンク、完了までのリトライ
//!             ├─ gate    block プローブで送信可になるまで待つ
//!             ├─ touch   チャンク先頭・末尾のページを常駐させる
//!             └─ m5pipe_trap::Marshaler
//! ```
//!
//! ## 使用例
//!
//! ```no_run
//! use m5pipe_stream::{IoStream, PipeStream, StreamConfig};
//! use m5pipe_trap::M5Trap;
//!
//! let mut stream = PipeStream::new(M5Trap, StreamConfig::default());
//! let buf = stream.alloc_buffer(64).unwrap();
//! buf[..4].copy_from_slice(b"ping");
//! stream.commit_buffer(4);
//!
//! let mut reply = [0u8; 4];
//! let _ = stream.read_fully(Some(&mut reply), 4);
//! ```

pub mod buffer;
pub mod config;
pub mod error;
pub mod fatal;
pub mod gate;
pub mod io_stream;
#[cfg(any(test, feature = "loopback"))]
pub mod loopback;
pub mod platform;
pub mod stats;
pub mod stream;
pub mod touch;
pub mod transfer;

pub use buffer::SendBuffer;
pub use config::StreamConfig;
pub use error::{ConfigError, StreamError};
pub use fatal::FatalPolicy;
pub use gate::{wait_for_admission, GatePolicy};
pub use io_stream::IoStream;
#[cfg(any(test, feature = "loopback"))]
pub use loopback::{CallRecord, LoopbackHost};
pub use platform::page_size;
pub use stats::StreamStats;
pub use stream::PipeStream;
pub use touch::{PageToucher, VolatileToucher};
pub use transfer::Transport;
