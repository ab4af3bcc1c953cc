//! 信頼トランスポート本体
//!
//! 1 本のリンクにつき 1 つの [`Transport`] を持つ。送信、受信、タイマー処理はすべて
//! 呼び出し側のスレッドで同期的に実行され、内部でヒープ確保は行わない。
//!
//! ## 送信の流れ
//!
//! ```text
//! send(信頼)   → 未 ACK キューに追加 → (hot) ステージングに積んでフラッシュ
//! send(非信頼) → ステージングに直接追記 → (hot) フラッシュ
//! tick         → 最古の未 ACK の送信から再送間隔を過ぎていれば、先頭から最大 N パケット再送
//! ACK 受信     → キューが進んだら、まだ一度も送っていないメッセージを最大 M パケット送る
//! ```

use log::{debug, info, trace, warn};
use relink_proto::{body_len, framed_len, MessageKind, HEADER_LEN, NO_TAG};

use crate::config::TransportConfig;
use crate::connection::{ConnectionRecord, ConnectionState};
use crate::error::{ConfigError, SendError, TimedOut};
use crate::link::{Handler, Link};
use crate::stats::TransportStats;
use crate::{DEFAULT_MTU, DEFAULT_QUEUE_DEPTH, DEFAULT_REGION_CAPACITY};

/// 信頼トランスポート
///
/// - `MTU`: リンクが受け付ける最大パケット長
/// - `DEPTH`: 未 ACK キューのエントリ数上限
/// - `REGION`: 未 ACK キューのバイト領域
pub struct Transport<
    L,
    H,
    const MTU: usize = DEFAULT_MTU,
    const DEPTH: usize = DEFAULT_QUEUE_DEPTH,
    const REGION: usize = DEFAULT_REGION_CAPACITY,
> {
    pub(crate) link: L,
    pub(crate) handler: H,
    pub(crate) config: TransportConfig,
    pub(crate) state: ConnectionState,
    pub(crate) record: ConnectionRecord<MTU, DEPTH, REGION>,
    pub(crate) stats: TransportStats,
}

impl<L: Link, H: Handler, const MTU: usize, const DEPTH: usize, const REGION: usize>
    Transport<L, H, MTU, DEPTH, REGION>
{
    /// 新しいトランスポートを生成する（状態は `Idle`）
    ///
    /// # 引数
    /// * `link` - 下位の非信頼リンク
    /// * `handler` - 受信イベントの通知先
    /// * `config` - タイマー設定
    /// * `now_ms` - 現在時刻（ミリ秒）
    ///
    /// # エラー
    /// 設定値が不正、または容量が 1 メッセージも保持できない場合 `ConfigError`
    pub fn new(link: L, handler: H, config: TransportConfig, now_ms: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let max_body = ConnectionRecord::<MTU, DEPTH, REGION>::max_body_len();
        if max_body == 0 || DEPTH == 0 || REGION < MTU.saturating_sub(HEADER_LEN) {
            return Err(ConfigError::CapacityTooSmall);
        }

        Ok(Transport {
            link,
            handler,
            config,
            state: ConnectionState::Idle,
            record: ConnectionRecord::new(now_ms),
            stats: TransportStats::default(),
        })
    }

    /// メッセージを送信する
    ///
    /// 信頼メッセージは未 ACK キューに入り、ACK されるまで再送される。
    /// 非信頼メッセージ（Ping、SingleUnreliable など）は次のパケットに 1 回だけ載る。
    ///
    /// # 引数
    /// * `kind` - メッセージ種別
    /// * `payload` - 本体
    /// * `tag` - 先頭に付けるタグ（`NO_TAG` なら付けない）
    /// * `hot` - すぐにフラッシュするか
    /// * `now_ms` - 現在時刻（ミリ秒）
    ///
    /// # エラー
    /// - `SendError::UnsupportedKind`: パケットクラス専用の種別
    /// - `SendError::PayloadTooLarge` / `QueueFull` / `RegionFull`: 受け付けられない（状態は変化しない）
    /// - `SendError::LinkRejected`: hot 送信のフラッシュ失敗（メッセージはステージングかキューに残る）
    pub fn send(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
        tag: u8,
        hot: bool,
        now_ms: u64,
    ) -> Result<(), SendError> {
        if kind.is_multiple() || matches!(kind, MessageKind::MultiPart | MessageKind::Ack) {
            return Err(SendError::UnsupportedKind(kind.raw()));
        }

        if kind.is_always_unreliable() {
            self.send_unreliable(kind, payload, tag, hot, now_ms)
        } else {
            self.send_reliable(kind, payload, tag, hot, now_ms)
        }
    }

    /// 未 ACK キューの連続範囲をステージングに積む
    ///
    /// # 戻り値
    /// 積んだメッセージ数
    pub fn append_pending(&mut self, newest_first: bool) -> usize {
        let appended = self.record.append_pending(newest_first);
        if appended > 0 {
            trace!("staged {} pending message(s) (newest_first={})", appended, newest_first);
        }
        appended
    }

    /// ステージング中のパケットをリンクへ送る
    ///
    /// 何も積まれていなくてもヘッダーのみの ACK パケットを送る。
    /// 失敗した場合はステージングの内容をそのまま残す。
    ///
    /// # エラー
    /// - `SendError::LinkRejected`: リンクが送信を拒否した
    pub fn flush(&mut self, now_ms: u64) -> Result<(), SendError> {
        let last_received_id = self.record.last_received_id();
        let packet = self.record.tx_staging.finalize(last_received_id);
        let len = packet.len();

        if !self.link.send_packet(packet) {
            self.stats.send_failures = self.stats.send_failures.saturating_add(1);
            warn!("link rejected {}-byte packet", len);
            return Err(SendError::LinkRejected);
        }

        trace!("sent {}-byte packet (ack #{})", len, last_received_id);
        self.stats.packets_sent = self.stats.packets_sent.saturating_add(1);
        let reliable = self.record.tx_staging.reliable_range();
        self.record.tx_staging.reset();
        // 非信頼だけのパケットは再送タイマーに影響しない
        if let Some((first, last)) = reliable {
            self.record.mark_sent(first, last, now_ms);
        }
        Ok(())
    }

    /// タイマー処理（定期的に呼ぶ）
    ///
    /// `Idle` / `Disconnected` の間は何もしない。
    ///
    /// # エラー
    /// 接続タイムアウトを超えて受信がない場合 `TimedOut`（呼び出し側が `reset` する）
    pub fn tick(&mut self, now_ms: u64) -> Result<(), TimedOut> {
        if !self.state.is_active() {
            return Ok(());
        }

        let silent_for_ms = now_ms.saturating_sub(self.record.last_receive_time);
        if silent_for_ms > self.config.connection_timeout_ms {
            self.stats.timeouts = self.stats.timeouts.saturating_add(1);
            warn!("connection timed out ({} ms silent, state {:?})", silent_for_ms, self.state);
            return Err(TimedOut { silent_for_ms });
        }

        if now_ms.saturating_sub(self.record.last_unacked_send_time) > self.config.retransmit_interval_ms {
            match self.resend_pending(0, self.config.resend_packets_per_tick, now_ms) {
                // 未 ACK がなくても ACK 兼キープアライブとして送る（失敗したステージングの再試行も兼ねる）
                Ok(0) => {
                    if let Err(err) = self.flush(now_ms) {
                        debug!("keepalive flush failed: {}", err);
                    }
                }
                Ok(_) => {}
                Err(err) => debug!("retransmit flush failed: {}", err),
            }
            self.record.last_unacked_send_time = now_ms;
        }

        Ok(())
    }

    /// プレタイムアウトを超えて受信がないか
    pub fn is_pretimed_out(&self, now_ms: u64) -> bool {
        self.state.is_active()
            && now_ms.saturating_sub(self.record.last_receive_time) > self.config.pretimeout_ms
    }

    /// 接続要求を送る
    ///
    /// `Idle` / `Disconnected` からのみ。接続レコードを初期化してから送信する。
    ///
    /// # エラー
    /// - `SendError::InvalidState`: 接続処理中または接続済み
    /// - `SendError::LinkRejected`: 送信失敗（要求はキューに残り再送される）
    pub fn connect(&mut self, now_ms: u64) -> Result<(), SendError> {
        if self.state.is_active() {
            return Err(SendError::InvalidState);
        }

        self.record.reinitialize(now_ms);
        self.state = ConnectionState::ConnectRequested;
        info!("requesting connection");
        self.send(MessageKind::ConnectionRequest, &[], NO_TAG, true, now_ms)
    }

    /// 受信した接続要求に応答し、接続を確立する
    ///
    /// # エラー
    /// - `SendError::InvalidState`: 接続要求を受信していない
    /// - `SendError::LinkRejected`: 送信失敗（応答はキューに残り再送される）
    pub fn finish_connection(&mut self, now_ms: u64) -> Result<(), SendError> {
        if self.state != ConnectionState::ConnectReceived {
            return Err(SendError::InvalidState);
        }

        self.state = ConnectionState::Connected;
        info!("accepting connection");
        self.send(MessageKind::ConnectionResponse, &[], NO_TAG, true, now_ms)
    }

    /// 切断要求を送り、接続をリセットする
    ///
    /// 切断要求は 1 回だけ送られる（ACK は待たない）。`Idle` / `Disconnected` では何もしない。
    pub fn disconnect(&mut self, now_ms: u64) -> Result<(), SendError> {
        if !self.state.is_active() {
            return Ok(());
        }

        info!("disconnecting");
        let result = self.send(MessageKind::DisconnectRequest, &[], NO_TAG, true, now_ms);
        self.record.reinitialize(now_ms);
        self.state = ConnectionState::Disconnected;
        result
    }

    /// 送信せずに接続をリセットする（キューとステージングはすべて破棄）
    pub fn reset(&mut self, now_ms: u64) {
        debug!(
            "resetting connection ({:?}, {} pending dropped)",
            self.state,
            self.record.outbound_queue.len()
        );
        self.record.reinitialize(now_ms);
        self.state = ConnectionState::Idle;
    }

    /// RTT 計測用の Ping を送る（送信時刻をペイロードに入れる）
    pub fn ping(&mut self, now_ms: u64) -> Result<(), SendError> {
        self.send(MessageKind::Ping, &now_ms.to_le_bytes(), NO_TAG, true, now_ms)?;
        self.stats.pings_sent = self.stats.pings_sent.saturating_add(1);
        Ok(())
    }

    /// 統計情報を取得する
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            pending_count: self.record.outbound_queue.len(),
            ..self.stats
        }
    }

    /// 接続状態
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// タイマー設定
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// ACK 待ちの信頼メッセージ数
    pub fn pending_count(&self) -> usize {
        self.record.outbound_queue.len()
    }

    /// 接続レコード
    pub fn record(&self) -> &ConnectionRecord<MTU, DEPTH, REGION> {
        &self.record
    }

    /// 下位リンク
    pub fn link(&self) -> &L {
        &self.link
    }

    /// 下位リンク（可変）
    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// イベント通知先
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// イベント通知先（可変）
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// リンクと通知先を取り出す
    pub fn into_parts(self) -> (L, H) {
        (self.link, self.handler)
    }

    // ===== Private メソッド =====

    /// ACK で未 ACK キューが進んだあとに呼ぶ
    ///
    /// まだ一度も送っていないメッセージがあれば、再送タイマーを待たずに送る。
    pub(crate) fn send_unsent_after_ack(&mut self, now_ms: u64) {
        let max_packets = self.config.resend_packets_on_ack;
        if max_packets == 0 || !self.state.is_active() {
            return;
        }
        let Some(skip) = self.record.outbound_queue.first_unsent() else {
            return;
        };
        if let Err(err) = self.resend_pending(skip, max_packets, now_ms) {
            debug!("send after ack failed: {}", err);
        }
    }

    /// 未 ACK キューの `skip` 件目以降を、最大 `max_packets` パケットに分けて送る
    ///
    /// # 戻り値
    /// 送った信頼パケット数
    fn resend_pending(&mut self, mut skip: usize, max_packets: u32, now_ms: u64) -> Result<u32, SendError> {
        let mut packets = 0;
        while packets < max_packets {
            let appended = self.record.append_pending_from(skip);
            if appended == 0 {
                break;
            }
            self.flush(now_ms)?;
            self.stats.retransmit_flushes = self.stats.retransmit_flushes.saturating_add(1);
            trace!("resent {} message(s) from position {}", appended, skip);
            skip += appended;
            packets += 1;
        }
        Ok(packets)
    }

    fn send_reliable(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
        tag: u8,
        hot: bool,
        now_ms: u64,
    ) -> Result<(), SendError> {
        let seq_id = self.record.enqueue(kind, tag, payload)?;
        self.stats.reliable_queued = self.stats.reliable_queued.saturating_add(1);
        debug!("queued {:?} #{} ({} bytes)", kind, seq_id, payload.len());

        if hot {
            self.append_pending(true);
            self.flush(now_ms)?;
        }
        Ok(())
    }

    fn send_unreliable(
        &mut self,
        kind: MessageKind,
        payload: &[u8],
        tag: u8,
        hot: bool,
        now_ms: u64,
    ) -> Result<(), SendError> {
        if body_len(payload.len(), tag) > ConnectionRecord::<MTU, DEPTH, REGION>::max_body_len() {
            return Err(SendError::PayloadTooLarge);
        }

        let framed = framed_len(payload.len(), tag);
        if self.record.tx_staging.remaining() < framed {
            // 入りきらないので今あるものを先に送る
            self.append_pending(false);
            self.flush(now_ms)?;
        }

        self.record
            .tx_staging
            .push_unreliable(kind, tag, payload)
            .map_err(|_| SendError::PayloadTooLarge)?;
        trace!("staged unreliable {:?} ({} bytes)", kind, payload.len());

        if hot {
            self.append_pending(true);
            self.flush(now_ms)?;
        }
        Ok(())
    }
}
