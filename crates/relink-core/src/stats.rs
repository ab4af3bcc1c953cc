//! トランスポート統計情報

use crate::error::ReceiveError;

/// RTT 平滑化係数（1/8）
const RTT_ALPHA_SHIFT: u32 = 3;

/// トランスポート統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct TransportStats {
    /// リンクが受け付けた送信パケット数
    pub packets_sent: u32,
    /// リンクが拒否した送信パケット数
    pub send_failures: u32,
    /// 再送タイマーまたは ACK 受信をきっかけに未 ACK キューから送ったパケット数
    pub retransmit_flushes: u32,
    /// 未 ACK キューに追加した信頼メッセージ数
    pub reliable_queued: u32,
    /// ACK で取り除いた信頼メッセージ数
    pub reliable_acked: u32,
    /// ACK 待ちの信頼メッセージ数
    pub pending_count: usize,

    /// ヘッダーを読めた受信パケット数
    pub packets_received: u32,
    /// アプリケーションへ渡したデータメッセージ数
    pub messages_delivered: u32,
    /// 重複・順序外として捨てた信頼サブメッセージ数
    pub duplicates_discarded: u32,
    /// ヘッダーより短い受信パケット数
    pub recv_too_short: u32,
    /// プレフィックス不一致の受信パケット数
    pub recv_bad_prefix: u32,
    /// シーケンス範囲不一致の受信パケット数
    pub recv_range_mismatch: u32,
    /// サブメッセージ長が壊れていた受信パケット数
    pub recv_overrun: u32,
    /// 処理できない種別のサブメッセージ数
    pub recv_unhandled: u32,
    /// 未接続状態で捨てたパケット数
    pub recv_unconnected: u32,

    /// 送信した Ping 数
    pub pings_sent: u32,
    /// 相手の Ping に返した PingEcho 数
    pub pings_echoed: u32,
    /// 直近の RTT（ミリ秒）
    pub last_rtt_ms: Option<u64>,
    /// 平滑化 RTT（ミリ秒）
    pub smoothed_rtt_ms: Option<u64>,
    /// 接続タイムアウト回数
    pub timeouts: u32,
}

impl TransportStats {
    /// 受信エラーを種別ごとに数える
    pub(crate) fn record_receive_error(&mut self, err: ReceiveError) {
        let counter = match err {
            ReceiveError::TooShort => &mut self.recv_too_short,
            ReceiveError::BadPrefix => &mut self.recv_bad_prefix,
            ReceiveError::RangeMismatch => &mut self.recv_range_mismatch,
            ReceiveError::SubmessageOverrun => &mut self.recv_overrun,
            ReceiveError::UnhandledKind(_) => &mut self.recv_unhandled,
            ReceiveError::NotConnected => &mut self.recv_unconnected,
        };
        *counter = counter.saturating_add(1);
    }

    /// RTT サンプルを記録する
    pub(crate) fn record_rtt(&mut self, rtt_ms: u64) {
        self.last_rtt_ms = Some(rtt_ms);
        self.smoothed_rtt_ms = Some(match self.smoothed_rtt_ms {
            None => rtt_ms,
            Some(srtt) => srtt - (srtt >> RTT_ALPHA_SHIFT) + (rtt_ms >> RTT_ALPHA_SHIFT),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_rtt_sample_sets_srtt() {
        let mut stats = TransportStats::default();
        stats.record_rtt(40);
        assert_eq!(stats.last_rtt_ms, Some(40));
        assert_eq!(stats.smoothed_rtt_ms, Some(40));
    }

    #[test]
    fn test_receive_errors_counted_per_kind() {
        let mut stats = TransportStats::default();
        stats.record_receive_error(ReceiveError::BadPrefix);
        stats.record_receive_error(ReceiveError::BadPrefix);
        stats.record_receive_error(ReceiveError::UnhandledKind(99));
        assert_eq!(stats.recv_bad_prefix, 2);
        assert_eq!(stats.recv_unhandled, 1);
        assert_eq!(stats.recv_too_short, 0);
    }

    #[test]
    fn test_srtt_converges() {
        let mut stats = TransportStats::default();
        stats.record_rtt(200);
        for _ in 0..50 {
            stats.record_rtt(40);
        }
        let srtt = stats.smoothed_rtt_ms.unwrap();
        assert!(srtt < 60, "SRTT は新しいサンプルに近づくべき: {}", srtt);
        assert_eq!(stats.last_rtt_ms, Some(40));
    }
}
