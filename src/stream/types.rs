//! ライブフィード型定義

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

use crate::config::SyncConfig;
use crate::error::Result;

/// ライブフィード接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// 接続中
    Connecting,
    /// 接続完了
    Open,
    /// 切断（再接続待ち、または停止済み）
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// トランスポートから受け取るフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// テキストフレーム
    Text(String),
    /// バイナリフレーム（フィードでは使用しない）
    Binary(Vec<u8>),
    /// クローズフレーム
    Close,
}

/// ストリームコンシューマ設定
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// 接続先URL
    pub url: Url,
    /// バッファ容量（イベント数）
    pub capacity: usize,
    /// 再接続までの固定待ち時間
    pub reconnect_delay: Duration,
}

impl StreamConfig {
    pub const DEFAULT_CAPACITY: usize = 100;
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

    /// デフォルト値で作成
    pub fn new(url: Url) -> Self {
        Self {
            url,
            capacity: Self::DEFAULT_CAPACITY,
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        }
    }

    /// アプリケーション設定から作成
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Ok(Self {
            url: config.feed_url()?,
            capacity: config.stream.buffer_capacity,
            reconnect_delay: config.reconnect_delay(),
        })
    }

    /// バッファ容量を設定
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// 再接続待ち時間を設定
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

/// フィード統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    /// バッファに追加されたイベント数
    pub accepted: u64,
    /// 一時停止中に破棄されたイベント数
    pub dropped_while_paused: u64,
    /// 不正・未知のメッセージとして破棄された数
    pub discarded: u64,
    /// 接続試行回数
    pub connect_attempts: u64,
}
