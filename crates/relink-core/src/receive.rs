//! 受信パケットの分解とディスパッチ
//!
//! 1. ヘッダーを検証する
//! 2. Multiple* クラスなら全サブメッセージの長さとシーケンス範囲を先に検証する
//!    （壊れたパケットで状態を途中まで変更しないため）
//! 3. `Idle` / `Disconnected` では、最初の信頼サブメッセージが接続要求のパケットだけを通す
//! 4. 信頼サブメッセージは期待する ID と一致したものだけを受け付ける
//!    （重複・順序外は黙って捨て、NACK は返さない）
//! 5. ヘッダーの `last_received_id` で未 ACK キューを累積 ACK し、
//!    キューが進んだら未送信のメッセージを送る

use log::{debug, info, trace, warn};
use relink_proto::{FrameIter, MessageKind, PacketHeader, SequenceId, WireError, HEADER_LEN, NO_TAG};

use crate::connection::ConnectionState;
use crate::error::ReceiveError;
use crate::link::{Handler, Link};
use crate::transport::Transport;

/// 1 パケット分のディスパッチ結果
#[derive(Debug, Default)]
struct DispatchOutcome {
    /// 最初に出会った処理できない種別
    first_unhandled: Option<u8>,
    /// 切断要求で接続がリセットされた
    reset: bool,
}

impl<L: Link, H: Handler, const MTU: usize, const DEPTH: usize, const REGION: usize>
    Transport<L, H, MTU, DEPTH, REGION>
{
    /// リンクから受け取ったパケットを処理する
    ///
    /// # 引数
    /// * `packet` - 受信したデータグラム
    /// * `now_ms` - 現在時刻（ミリ秒）
    ///
    /// # エラー
    /// - `TooShort` / `BadPrefix` / `RangeMismatch` / `SubmessageOverrun`:
    ///   パケットを丸ごと捨てた（状態は変化しない）
    /// - `NotConnected`: 未接続状態で接続要求以外を受け取った（丸ごと捨てた）
    /// - `UnhandledKind`: 処理できないサブメッセージがあった（他は処理済み、ACK も適用済み）。
    ///   単一メッセージクラスのヘッダーが未知の種別なら、パケットを丸ごと捨てる
    pub fn receive(&mut self, packet: &[u8], now_ms: u64) -> Result<(), ReceiveError> {
        let header = match PacketHeader::parse(packet) {
            Ok(header) => header,
            Err(err) => {
                let err = match err {
                    WireError::BadPrefix => ReceiveError::BadPrefix,
                    _ => ReceiveError::TooShort,
                };
                return Err(self.reject(err));
            }
        };
        let body = &packet[HEADER_LEN..];
        self.stats.packets_received = self.stats.packets_received.saturating_add(1);

        let is_multiple = header.kind().map_or(false, |kind| kind.is_multiple());
        if is_multiple {
            if let Err(err) = validate_multiple(&header, body) {
                return Err(self.reject(err));
            }
        } else {
            if header.kind().is_none() {
                // ID を消費せず、ACK も適用しない
                return Err(self.reject(ReceiveError::UnhandledKind(header.class)));
            }
            if header.seq_id_min != header.seq_id_max {
                return Err(self.reject(ReceiveError::RangeMismatch));
            }
        }

        if !self.state.is_active() && !starts_with_connection_request(&header, body) {
            return Err(self.reject(ReceiveError::NotConnected));
        }

        let outcome = if is_multiple {
            self.dispatch_multiple(&header, body, now_ms)
        } else {
            let seq_id = if MessageKind::raw_is_always_unreliable(header.class) {
                None
            } else {
                Some(header.seq_id_min)
            };
            let mut outcome = DispatchOutcome::default();
            self.dispatch(header.class, seq_id, body, now_ms, &mut outcome);
            outcome
        };

        if !outcome.reset {
            let acked = self.record.acknowledge_through(header.last_received_id);
            self.record.last_receive_time = now_ms;
            if acked > 0 {
                self.stats.reliable_acked = self.stats.reliable_acked.saturating_add(acked as u32);
                trace!("#{} acknowledged, {} retired", header.last_received_id, acked);
                self.send_unsent_after_ack(now_ms);
            }
        }

        match outcome.first_unhandled {
            Some(kind) => Err(ReceiveError::UnhandledKind(kind)),
            None => Ok(()),
        }
    }

    // ===== Private メソッド =====

    fn reject(&mut self, err: ReceiveError) -> ReceiveError {
        self.stats.record_receive_error(err);
        warn!("dropping packet: {}", err);
        err
    }

    fn dispatch_multiple(&mut self, header: &PacketHeader, body: &[u8], now_ms: u64) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let mut next_id = header.seq_id_min;

        // 検証済みなので Err は出ない
        for frame in FrameIter::new(body).flatten() {
            let seq_id = if frame.is_counted() {
                let id = next_id;
                next_id = id.next();
                Some(id)
            } else {
                None
            };

            self.dispatch(frame.kind, seq_id, frame.body, now_ms, &mut outcome);
            if outcome.reset {
                break;
            }
        }
        outcome
    }

    /// サブメッセージを 1 つ処理する
    ///
    /// `seq_id` が `Some` なら信頼メッセージで、期待する ID と一致した場合だけ処理する。
    fn dispatch(
        &mut self,
        kind: u8,
        seq_id: Option<SequenceId>,
        body: &[u8],
        now_ms: u64,
        outcome: &mut DispatchOutcome,
    ) {
        if let Some(seq_id) = seq_id {
            if !self.record.accept_inbound(seq_id) {
                self.stats.duplicates_discarded = self.stats.duplicates_discarded.saturating_add(1);
                trace!("discarding #{} (expecting #{})", seq_id, self.record.next_in_seq);
                return;
            }
        }

        match MessageKind::try_from(kind) {
            Ok(MessageKind::ConnectionRequest) => {
                info!("connection requested by peer");
                self.state = ConnectionState::ConnectReceived;
                self.handler.on_connection_requested();
            }
            Ok(MessageKind::ConnectionResponse) => {
                if self.state != ConnectionState::ConnectRequested {
                    debug!("ignoring connection response in state {:?}", self.state);
                    return;
                }
                info!("connection established");
                self.state = ConnectionState::Connected;
                self.handler.on_connected();
            }
            Ok(MessageKind::DisconnectRequest) => {
                info!("peer disconnected");
                self.record.reinitialize(now_ms);
                self.state = ConnectionState::Disconnected;
                self.handler.on_disconnected();
                outcome.reset = true;
            }
            Ok(MessageKind::SingleReliable) | Ok(MessageKind::SingleUnreliable) => {
                self.stats.messages_delivered = self.stats.messages_delivered.saturating_add(1);
                self.handler.on_data_received(body);
            }
            Ok(MessageKind::Ping) => self.echo_ping(body, now_ms),
            Ok(MessageKind::PingEcho) => self.record_ping_echo(body, now_ms),
            Ok(MessageKind::Ack) => {}
            _ => {
                self.stats.record_receive_error(ReceiveError::UnhandledKind(kind));
                debug!("unhandled message kind {}", kind);
                outcome.first_unhandled.get_or_insert(kind);
            }
        }
    }

    fn echo_ping(&mut self, body: &[u8], now_ms: u64) {
        match self.send(MessageKind::PingEcho, body, NO_TAG, true, now_ms) {
            Ok(()) => self.stats.pings_echoed = self.stats.pings_echoed.saturating_add(1),
            Err(err) => debug!("ping echo failed: {}", err),
        }
    }

    fn record_ping_echo(&mut self, body: &[u8], now_ms: u64) {
        let Ok(sent) = <[u8; 8]>::try_from(body) else {
            debug!("ignoring {}-byte ping echo", body.len());
            return;
        };
        let rtt_ms = now_ms.saturating_sub(u64::from_le_bytes(sent));
        self.stats.record_rtt(rtt_ms);
        trace!("rtt sample {} ms", rtt_ms);
    }
}

/// 最初の信頼サブメッセージが接続要求か
fn starts_with_connection_request(header: &PacketHeader, body: &[u8]) -> bool {
    let first_counted = if header.kind().map_or(false, |kind| kind.is_multiple()) {
        FrameIter::new(body)
            .flatten()
            .find(|frame| frame.is_counted())
            .map(|frame| frame.kind)
    } else {
        Some(header.class)
    };
    first_counted == Some(MessageKind::ConnectionRequest.raw())
}

/// Multiple* パケットの構造を検証する
///
/// 信頼サブメッセージの数がヘッダーの範囲の長さと一致しなければ `RangeMismatch`。
fn validate_multiple(header: &PacketHeader, body: &[u8]) -> Result<(), ReceiveError> {
    let mut counted: u32 = 0;
    for frame in FrameIter::new(body) {
        let frame = frame.map_err(|_| ReceiveError::SubmessageOverrun)?;
        if frame.is_counted() {
            counted += 1;
        }
    }

    if !header.has_reliable_range() {
        return if counted == 0 {
            Ok(())
        } else {
            Err(ReceiveError::RangeMismatch)
        };
    }

    let (min, max) = (header.seq_id_min, header.seq_id_max);
    if !min.is_valid() || !max.is_valid() {
        return Err(ReceiveError::RangeMismatch);
    }
    if counted != u32::from(SequenceId::distance(min, max)) + 1 {
        return Err(ReceiveError::RangeMismatch);
    }
    Ok(())
}
