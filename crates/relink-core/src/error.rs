//! relink-core エラー型
//!
//! - 呼び出し側の契約違反（大きすぎる、キュー満杯）: `QueueError` / `SendError`
//! - 壊れた受信パケット: `ReceiveError`（そのパケットだけを捨て、接続状態は変えない）
//! - リンク層の送信失敗: `SendError::LinkRejected`
//! - 致命的: `TimedOut`（呼び出し側が接続をリセットする）

/// 未 ACK キューへの追加エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// 1 パケットに収まらない
    PayloadTooLarge,
    /// エントリ数の上限に達している
    QueueFull,
    /// バイト領域に空きがない
    RegionFull,
}

impl core::fmt::Display for QueueError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            QueueError::PayloadTooLarge => write!(f, "Message too large for a single packet"),
            QueueError::QueueFull => write!(f, "Outbound queue full"),
            QueueError::RegionFull => write!(f, "Outbound byte region full"),
        }
    }
}

/// 送信エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// 1 パケットに収まらない（分割送信は未サポート）
    PayloadTooLarge,
    /// 未 ACK キューのエントリ数上限
    QueueFull,
    /// 未 ACK キューのバイト領域上限
    RegionFull,
    /// この種別はアプリケーションから送信できない
    UnsupportedKind(u8),
    /// 現在の接続状態では実行できない操作
    InvalidState,
    /// 下位リンクが送信を拒否した（呼び出し側は接続断として扱う）
    LinkRejected,
}

impl From<QueueError> for SendError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::PayloadTooLarge => SendError::PayloadTooLarge,
            QueueError::QueueFull => SendError::QueueFull,
            QueueError::RegionFull => SendError::RegionFull,
        }
    }
}

impl core::fmt::Display for SendError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SendError::PayloadTooLarge => write!(f, "Message too large for a single packet"),
            SendError::QueueFull => write!(f, "Outbound queue full"),
            SendError::RegionFull => write!(f, "Outbound byte region full"),
            SendError::UnsupportedKind(kind) => write!(f, "Message kind {} cannot be sent directly", kind),
            SendError::InvalidState => write!(f, "Operation not valid in current connection state"),
            SendError::LinkRejected => write!(f, "Unreliable link rejected the packet"),
        }
    }
}

/// 受信エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveError {
    /// 固定ヘッダーより短い
    TooShort,
    /// リンクプレフィックス不一致
    BadPrefix,
    /// ヘッダーのシーケンス範囲と内容が一致しない
    RangeMismatch,
    /// サブメッセージの宣言長が残りバイト数を超えている
    SubmessageOverrun,
    /// 処理できない種別（後続のサブメッセージは処理済み）
    UnhandledKind(u8),
    /// 未接続の相手からの、接続要求で始まらないパケット
    NotConnected,
}

impl core::fmt::Display for ReceiveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ReceiveError::TooShort => write!(f, "Packet shorter than header"),
            ReceiveError::BadPrefix => write!(f, "Packet has wrong link prefix"),
            ReceiveError::RangeMismatch => write!(f, "Sequence range does not match packet contents"),
            ReceiveError::SubmessageOverrun => write!(f, "Sub-message length exceeds packet"),
            ReceiveError::UnhandledKind(kind) => write!(f, "Unhandled message kind {}", kind),
            ReceiveError::NotConnected => write!(f, "Packet from unconnected peer is not a connection request"),
        }
    }
}

/// 接続タイムアウト（tick の唯一の致命的結果）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut {
    /// 最後の受信からの経過時間（ミリ秒）
    pub silent_for_ms: u64,
}

impl core::fmt::Display for TimedOut {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Connection timed out after {} ms without receiving", self.silent_for_ms)
    }
}

/// 設定エラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// プレタイムアウトが接続タイムアウト以上
    PretimeoutNotBelowTimeout,
    /// 再送間隔が 0、または接続タイムアウト以上
    InvalidRetransmitInterval,
    /// MTU / バイト領域が 1 メッセージを保持できない
    CapacityTooSmall,
    /// 再送タイマー 1 回あたりのパケット数が 0
    InvalidResendBudget,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::PretimeoutNotBelowTimeout => write!(f, "Pretimeout must be below connection timeout"),
            ConfigError::InvalidRetransmitInterval => {
                write!(f, "Retransmit interval must be non-zero and below connection timeout")
            }
            ConfigError::CapacityTooSmall => write!(f, "MTU or region capacity too small for one message"),
            ConfigError::InvalidResendBudget => write!(f, "Resend packets per tick must be at least 1"),
        }
    }
}
