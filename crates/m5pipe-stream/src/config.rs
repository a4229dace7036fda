//! ストリーム設定

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::fatal::FatalPolicy;
use crate::gate::GatePolicy;

/// [`crate::PipeStream`] の設定
///
/// JSON の例（省略したフィールドは既定値）:
/// ```json
/// { "buffer_size": 10000, "gate_interval_us": 10, "fatal_policy": "abort" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// 送信バッファの初期サイズ
    pub buffer_size: usize,
    /// ゲートが busy のときの待ち時間（マイクロ秒）
    pub gate_interval_us: u64,
    /// ゲートのプローブ上限（None = 無制限）
    pub gate_max_probes: Option<u32>,
    /// 送信バッファの最大サイズ（None = 無制限）
    pub max_buffer_size: Option<usize>,
    /// チャンクサイズ。None なら実行環境のページサイズ
    pub page_size: Option<usize>,
    pub fatal_policy: FatalPolicy,
    /// バッファ確保などをホストに debug 呼び出しで通知する
    pub debug_host: bool,
}

impl StreamConfig {
    pub const DEFAULT_BUFFER_SIZE: usize = 10000;

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: StreamConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == Some(0) {
            return Err(ConfigError::ZeroPageSize);
        }
        if let Some(max) = self.max_buffer_size {
            if self.buffer_size > max {
                return Err(ConfigError::BufferLimit { buffer_size: self.buffer_size, max });
            }
        }
        Ok(())
    }

    pub fn gate_policy(&self) -> GatePolicy {
        GatePolicy {
            interval: Duration::from_micros(self.gate_interval_us),
            max_probes: self.gate_max_probes,
        }
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_max_buffer_size(mut self, max: usize) -> Self {
        self.max_buffer_size = Some(max);
        self
    }

    pub fn with_gate(mut self, policy: GatePolicy) -> Self {
        self.gate_interval_us = policy.interval.as_micros() as u64;
        self.gate_max_probes = policy.max_probes;
        self
    }

    pub fn with_fatal_policy(mut self, policy: FatalPolicy) -> Self {
        self.fatal_policy = policy;
        self
    }

    pub fn with_debug_host(mut self, enabled: bool) -> Self {
        self.debug_host = enabled;
        self
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            buffer_size: Self::DEFAULT_BUFFER_SIZE,
            gate_interval_us: GatePolicy::DEFAULT_INTERVAL.as_micros() as u64,
            gate_max_probes: None,
            max_buffer_size: None,
            page_size: None,
            fatal_policy: FatalPolicy::Abort,
            debug_host: false,
        }
    }
}
