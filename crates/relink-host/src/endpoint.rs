//! ポーリング型エンドポイント
//!
//! `UdpLink` と `Mailbox` を持つトランスポートに単調時計を組み合わせる。
//! アプリケーションは `poll` を定期的に呼び、返ってきたイベントを処理する。
//!
//! ```text
//! poll()
//!   ├── ソケットから受信できるだけ受信 → Transport::receive
//!   ├── 接続要求を自動受理（auto_accept 時）
//!   ├── Transport::tick（タイムアウトなら reset して TimedOut を通知）
//!   └── Mailbox のイベントを返す
//! ```

use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Instant;

use log::{debug, info, warn};
use relink_core::{
    ConnectionState, DefaultTransport, MessageKind, TransportConfig, TransportStats, DEFAULT_MTU, NO_TAG,
};
use serde::Serialize;

use crate::error::HostError;
use crate::mailbox::{LinkEvent, Mailbox};
use crate::udp::UdpLink;

/// `stats_json` の出力
#[derive(Debug, Serialize)]
struct StatsReport {
    state: ConnectionState,
    peer: Option<String>,
    transport: TransportStats,
    total_sent_bytes: u64,
    total_received_bytes: u64,
}

/// UDP 上の信頼トランスポートのエンドポイント
pub struct Endpoint {
    /// トランスポート本体
    transport: DefaultTransport<UdpLink, Mailbox>,
    /// 時刻の原点
    clock: Instant,
    /// 受信バッファ（MTU サイズ）
    recv_buf: Vec<u8>,
    /// 接続要求を自動で受理するか（待ち受け側）
    auto_accept: bool,
}

impl Endpoint {
    /// ローカルアドレスにバインドする
    ///
    /// # エラー
    /// - `HostError::Io`: バインド失敗
    /// - `HostError::Config`: 設定値が不正
    pub fn bind(local: impl ToSocketAddrs, config: TransportConfig) -> Result<Self, HostError> {
        let link = UdpLink::bind(local)?;
        let transport = DefaultTransport::new(link, Mailbox::new(), config, 0)?;

        Ok(Endpoint {
            transport,
            clock: Instant::now(),
            recv_buf: vec![0u8; DEFAULT_MTU],
            auto_accept: false,
        })
    }

    /// 接続要求を自動で受理する待ち受けエンドポイントにする
    pub fn with_auto_accept(mut self, auto_accept: bool) -> Self {
        self.auto_accept = auto_accept;
        self
    }

    /// 相手に接続要求を送る
    pub fn connect(&mut self, peer: SocketAddr) -> Result<(), HostError> {
        let now = self.now_ms();
        self.transport.link_mut().set_peer(peer);
        self.transport.connect(now)?;
        info!("connecting to {}", peer);
        Ok(())
    }

    /// 受信、タイマー処理を行い、溜まったイベントを返す
    ///
    /// # エラー
    /// - `HostError::Io`: ソケットの受信エラー（WouldBlock 以外）
    pub fn poll(&mut self) -> Result<Vec<LinkEvent>, HostError> {
        let now = self.now_ms();

        while let Some((len, from)) = self.transport.link().recv_from(&mut self.recv_buf)? {
            if !self.transport.link_mut().accept_from(from) {
                debug!("ignoring datagram from {}", from);
                continue;
            }
            if let Err(err) = self.transport.receive(&self.recv_buf[..len], now) {
                debug!("receive from {}: {}", from, err);
            }
        }

        if self.auto_accept && self.transport.state() == ConnectionState::ConnectReceived {
            if let Err(err) = self.transport.finish_connection(now) {
                // 応答はキューに残っているので tick で再送される
                debug!("connection response not sent yet: {}", err);
            }
        }

        if let Err(timeout) = self.transport.tick(now) {
            warn!("{}", timeout);
            self.transport.reset(now);
            self.transport.handler_mut().push(LinkEvent::TimedOut);
        }

        if self.auto_accept && !self.transport.state().is_active() {
            self.transport.link_mut().clear_peer();
        }

        Ok(self.transport.handler_mut().drain())
    }

    /// データを送る（すぐにフラッシュする）
    ///
    /// # エラー
    /// - `HostError::NotConnected`: 接続していない
    /// - `HostError::Send`: 大きすぎる、キュー満杯、リンク拒否
    pub fn send(&mut self, payload: &[u8], reliable: bool) -> Result<(), HostError> {
        if self.transport.state() != ConnectionState::Connected {
            return Err(HostError::NotConnected);
        }

        let kind = if reliable {
            MessageKind::SingleReliable
        } else {
            MessageKind::SingleUnreliable
        };
        let now = self.now_ms();
        self.transport.send(kind, payload, NO_TAG, true, now)?;
        self.transport.handler_mut().record_sent(payload.len());
        Ok(())
    }

    /// RTT 計測用の Ping を送る
    pub fn ping(&mut self) -> Result<(), HostError> {
        let now = self.now_ms();
        self.transport.ping(now)?;
        Ok(())
    }

    /// 切断要求を送る
    pub fn disconnect(&mut self) -> Result<(), HostError> {
        let now = self.now_ms();
        self.transport.disconnect(now)?;
        Ok(())
    }

    /// 接続状態
    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// 接続済みか
    pub fn is_connected(&self) -> bool {
        self.transport.state() == ConnectionState::Connected
    }

    /// 相手のアドレス
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.link().peer()
    }

    /// バインドしたローカルアドレス
    pub fn local_addr(&self) -> Result<SocketAddr, HostError> {
        Ok(self.transport.link().local_addr()?)
    }

    /// 統計情報
    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// 統計情報を JSON 文字列で返す
    ///
    /// ```json
    /// {
    ///   "state": "Connected",
    ///   "peer": "127.0.0.1:7400",
    ///   "transport": { "packets_sent": 12, "pending_count": 0, "smoothed_rtt_ms": 1, ... },
    ///   "total_sent_bytes": 64,
    ///   "total_received_bytes": 64
    /// }
    /// ```
    pub fn stats_json(&self) -> Result<String, HostError> {
        let mailbox = self.transport.handler();
        let report = StatsReport {
            state: self.transport.state(),
            peer: self.peer_addr().map(|peer| peer.to_string()),
            transport: self.transport.stats(),
            total_sent_bytes: mailbox.total_sent_bytes(),
            total_received_bytes: mailbox.total_received_bytes(),
        };
        Ok(serde_json::to_string(&report)?)
    }

    // ===== Private メソッド =====

    fn now_ms(&self) -> u64 {
        self.clock.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_rejects_invalid_config() {
        let config = TransportConfig::default().with_pretimeout_ms(10_000);
        let result = Endpoint::bind("127.0.0.1:0", config);
        assert!(matches!(result, Err(HostError::Config(_))));
    }

    #[test]
    fn test_send_requires_connection() {
        let mut endpoint = Endpoint::bind("127.0.0.1:0", TransportConfig::default()).unwrap();
        assert!(matches!(endpoint.send(b"x", true), Err(HostError::NotConnected)));
        assert_eq!(endpoint.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_idle_poll_is_quiet() {
        let mut endpoint = Endpoint::bind("127.0.0.1:0", TransportConfig::default())
            .unwrap()
            .with_auto_accept(true);
        assert!(endpoint.poll().unwrap().is_empty());
        assert_eq!(endpoint.stats().packets_sent, 0);
        assert_eq!(endpoint.peer_addr(), None);
    }

    #[test]
    fn test_stats_json_shape() {
        let endpoint = Endpoint::bind("127.0.0.1:0", TransportConfig::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&endpoint.stats_json().unwrap()).unwrap();

        assert_eq!(json["state"], "Idle");
        assert!(json["peer"].is_null());
        assert_eq!(json["transport"]["pending_count"], 0);
        assert!(json["transport"]["smoothed_rtt_ms"].is_null());
        assert_eq!(json["total_sent_bytes"], 0);
    }
}
