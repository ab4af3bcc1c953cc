//! relink-host エラー型

use relink_core::{ConfigError, SendError};
use thiserror::Error;

/// ホスト側エラー
#[derive(Debug, Error)]
pub enum HostError {
    /// ソケット操作の失敗
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    /// トランスポート設定が不正
    #[error("invalid transport configuration: {0}")]
    Config(ConfigError),

    /// 送信の失敗
    #[error("send failed: {0}")]
    Send(SendError),

    /// 接続していない
    #[error("endpoint is not connected")]
    NotConnected,

    /// 統計情報の JSON 変換失敗
    #[error("stats serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

// コアのエラー型は no_std なので std::error::Error を実装していない（#[from] は使えない）
impl From<ConfigError> for HostError {
    fn from(err: ConfigError) -> Self {
        HostError::Config(err)
    }
}

impl From<SendError> for HostError {
    fn from(err: SendError) -> Self {
        HostError::Send(err)
    }
}
