//! ストリームと puid をまとめたセッション

use std::sync::Arc;

use m5pipe_process::{Backend, ProcessError};
use m5pipe_stream::{ConfigError, PipeStream, StreamConfig};
use m5pipe_trap::{M5Trap, ProcessContext, Trap};

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),
}

/// 1 スレッド分のストリームとプロセスの puid
///
/// ## 内部構成
///
/// ```text
/// PipeSession
///   ├── PipeStream  (m5pipe-stream) - 送信バッファ + ゲート + チャンク転送
///   └── puid        (m5pipe-process) - プロセスで 1 回だけ決まる ID
/// ```
pub struct PipeSession<T = M5Trap> {
    stream: PipeStream<T>,
    puid: u64,
}

impl PipeSession<M5Trap> {
    /// gem5 のトラップでセッションを開く
    ///
    /// # エラー
    /// - `OpenError::Config`: 設定が不正
    pub fn open(config: StreamConfig) -> Result<Self, OpenError> {
        Self::with_trap(M5Trap, ProcessContext::global(), config)
    }

    /// JSON の設定からセッションを開く
    pub fn open_json(json: &str) -> Result<Self, OpenError> {
        Self::open(StreamConfig::from_json(json)?)
    }
}

impl<T: Trap> PipeSession<T> {
    /// 任意のトラップ実装でセッションを開く（疑似ホストでのテスト用）
    pub fn with_trap(trap: T, context: Arc<ProcessContext>, config: StreamConfig) -> Result<Self, OpenError> {
        config.validate()?;
        let puid = m5pipe_process::process_uid(Backend::Gem5Trap)?;
        log::debug!("opening session pid={} puid={:#x}", context.pid(), puid);

        Ok(PipeSession {
            stream: PipeStream::with_context(trap, context, config),
            puid,
        })
    }

    pub fn process_uid(&self) -> u64 {
        self.puid
    }

    pub fn stream(&self) -> &PipeStream<T> {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut PipeStream<T> {
        &mut self.stream
    }

    pub fn into_stream(self) -> PipeStream<T> {
        self.stream
    }

    /// 統計情報を JSON 文字列で返す
    pub fn stats_json(&self) -> String {
        self.stream.stats().to_json()
    }
}
