//! トランスポート設定
//!
//! バッファ容量（MTU、キュー深さ、バイト領域）はコンパイル時の const generics で決まる。
//! ここではタイマー系の実行時設定だけを扱う。

use crate::error::ConfigError;
use crate::{
    CONNECTION_TIMEOUT_MS, PRETIMEOUT_MS, RESEND_PACKETS_ON_ACK, RESEND_PACKETS_PER_TICK, RETRANSMIT_INTERVAL_MS,
};

/// タイマー設定（すべて `now_ms` と同じ単調時計のミリ秒）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportConfig {
    /// この時間受信がなければ接続タイムアウト
    pub connection_timeout_ms: u64,
    /// 上位層向けの注意喚起しきい値（プロトコル上の効果はない）
    pub pretimeout_ms: u64,
    /// 未 ACK メッセージの再送間隔
    pub retransmit_interval_ms: u64,
    /// 1 回の再送タイマーで送る最大パケット数（1 以上）
    pub resend_packets_per_tick: u32,
    /// ACK で未 ACK キューが進んだとき、未送信メッセージをすぐ送る最大パケット数（0 で無効）
    pub resend_packets_on_ack: u32,
}

impl TransportConfig {
    /// 接続タイムアウトを変更する
    pub fn with_connection_timeout_ms(mut self, ms: u64) -> Self {
        self.connection_timeout_ms = ms;
        self
    }

    /// プレタイムアウトを変更する
    pub fn with_pretimeout_ms(mut self, ms: u64) -> Self {
        self.pretimeout_ms = ms;
        self
    }

    /// 再送間隔を変更する
    pub fn with_retransmit_interval_ms(mut self, ms: u64) -> Self {
        self.retransmit_interval_ms = ms;
        self
    }

    /// 再送タイマー 1 回あたりの最大パケット数を変更する
    pub fn with_resend_packets_per_tick(mut self, packets: u32) -> Self {
        self.resend_packets_per_tick = packets;
        self
    }

    /// ACK 受信時に送る最大パケット数を変更する
    pub fn with_resend_packets_on_ack(mut self, packets: u32) -> Self {
        self.resend_packets_on_ack = packets;
        self
    }

    /// 設定値の整合性を検証する
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pretimeout_ms >= self.connection_timeout_ms {
            return Err(ConfigError::PretimeoutNotBelowTimeout);
        }
        if self.retransmit_interval_ms == 0 || self.retransmit_interval_ms >= self.connection_timeout_ms {
            return Err(ConfigError::InvalidRetransmitInterval);
        }
        if self.resend_packets_per_tick == 0 {
            return Err(ConfigError::InvalidResendBudget);
        }
        Ok(())
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connection_timeout_ms: CONNECTION_TIMEOUT_MS,
            pretimeout_ms: PRETIMEOUT_MS,
            retransmit_interval_ms: RETRANSMIT_INTERVAL_MS,
            resend_packets_per_tick: RESEND_PACKETS_PER_TICK,
            resend_packets_on_ack: RESEND_PACKETS_ON_ACK,
        }
    }
}
