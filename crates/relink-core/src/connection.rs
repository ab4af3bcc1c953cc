//! 接続ごとの状態
//!
//! シーケンスカウンタ、タイムスタンプ、送信ステージング、未 ACK キューを 1 つにまとめる。
//! 接続のリセットはその場で値を戻すだけで、バッファを作り直さない。

use log::trace;
use relink_proto::{body_len, MessageKind, SequenceId, FRAME_OVERHEAD, HEADER_LEN};

use crate::error::QueueError;
use crate::queue::OutboundQueue;
use crate::staging::TxStaging;

/// 接続状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum ConnectionState {
    /// 未接続（初期状態、リセット後）
    Idle,
    /// 接続要求を送信し、応答待ち
    ConnectRequested,
    /// 相手から接続要求を受信し、`finish_connection` 待ち
    ConnectReceived,
    /// 接続済み
    Connected,
    /// 切断済み（切断要求の送受信後）
    Disconnected,
}

impl ConnectionState {
    /// タイマー処理の対象となる状態か
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Idle | ConnectionState::Disconnected)
    }
}

/// 接続レコード
pub struct ConnectionRecord<const MTU: usize, const DEPTH: usize, const REGION: usize> {
    /// 次に送信する信頼メッセージの ID
    pub next_out_seq: SequenceId,
    /// 次に受け付ける信頼メッセージの ID
    pub next_in_seq: SequenceId,
    /// 最古の未 ACK メッセージを最後に送った時刻（再送タイマーの起点）
    pub last_unacked_send_time: u64,
    /// 最後に有効なパケットを受信した時刻
    pub last_receive_time: u64,
    /// 一度でも信頼メッセージを受け付けたか
    received_any: bool,
    /// 送信ステージング
    pub tx_staging: TxStaging<MTU>,
    /// 未 ACK キュー
    pub outbound_queue: OutboundQueue<DEPTH, REGION>,
}

impl<const MTU: usize, const DEPTH: usize, const REGION: usize> ConnectionRecord<MTU, DEPTH, REGION> {
    /// 新しい接続レコードを生成する
    pub fn new(now_ms: u64) -> Self {
        ConnectionRecord {
            next_out_seq: SequenceId::MIN,
            next_in_seq: SequenceId::MIN,
            last_unacked_send_time: now_ms,
            last_receive_time: now_ms,
            received_any: false,
            tx_staging: TxStaging::new(),
            outbound_queue: OutboundQueue::new(),
        }
    }

    /// 初期状態に戻す
    pub fn reinitialize(&mut self, now_ms: u64) {
        self.next_out_seq = SequenceId::MIN;
        self.next_in_seq = SequenceId::MIN;
        self.last_unacked_send_time = now_ms;
        self.last_receive_time = now_ms;
        self.received_any = false;
        self.tx_staging.reset();
        self.outbound_queue.clear();
    }

    /// 1 メッセージの本体（タグ込み）に許される最大長
    pub const fn max_body_len() -> usize {
        MTU.saturating_sub(HEADER_LEN + FRAME_OVERHEAD)
    }

    /// 信頼メッセージに ID を割り当てて未 ACK キューに追加する
    ///
    /// # 戻り値
    /// 割り当てた ID
    ///
    /// # エラー
    /// - `QueueError::PayloadTooLarge`: 1 パケットに収まらない
    /// - `QueueError::QueueFull` / `QueueError::RegionFull`: キュー容量不足
    pub fn enqueue(&mut self, kind: MessageKind, tag: u8, payload: &[u8]) -> Result<SequenceId, QueueError> {
        if body_len(payload.len(), tag) > Self::max_body_len() {
            return Err(QueueError::PayloadTooLarge);
        }

        let seq_id = self.next_out_seq;
        self.outbound_queue.push(seq_id, kind, tag, payload)?;
        self.next_out_seq = seq_id.next();

        trace!("enqueued {:?} as #{} ({} pending)", kind, seq_id, self.outbound_queue.len());
        Ok(seq_id)
    }

    /// 受信した ACK を未 ACK キューに適用する
    ///
    /// # 戻り値
    /// 取り除いたエントリ数
    pub fn acknowledge_through(&mut self, ack_id: SequenceId) -> usize {
        self.outbound_queue.acknowledge_through(ack_id)
    }

    /// 未 ACK キューの連続範囲をステージングに追記する
    ///
    /// `newest_first` なら最新のエントリから遡り（直前に追加したメッセージを確実に含める）、
    /// そうでなければ最古のエントリから詰める。
    ///
    /// # 戻り値
    /// 追記したエントリ数。既に信頼範囲がステージング済みなら 0。
    pub fn append_pending(&mut self, newest_first: bool) -> usize {
        if newest_first {
            if self.tx_staging.has_reliable() {
                return 0;
            }
            let budget = self.tx_staging.remaining();
            match self.outbound_queue.newest_run(budget) {
                Some(run) if self.tx_staging.push_reliable_run(&run) => run.count,
                _ => 0,
            }
        } else {
            self.append_pending_from(0)
        }
    }

    /// 先頭から `skip` 件目以降の連続範囲をステージングに追記する
    ///
    /// 再送で複数パケットに分けて送るときに使う。
    pub fn append_pending_from(&mut self, skip: usize) -> usize {
        if self.tx_staging.has_reliable() {
            return 0;
        }
        let budget = self.tx_staging.remaining();
        match self.outbound_queue.run_from(skip, budget) {
            Some(run) if self.tx_staging.push_reliable_run(&run) => run.count,
            _ => 0,
        }
    }

    /// `first..=last` を送信済みとして記録する
    ///
    /// 最古の未 ACK メッセージを含む場合だけ再送タイマーを進める。
    /// 新しいメッセージだけを送っても、古いメッセージの再送は遅らせない。
    pub fn mark_sent(&mut self, first: SequenceId, last: SequenceId, now_ms: u64) {
        if self.outbound_queue.front().map(|entry| entry.seq_id) == Some(first) {
            self.last_unacked_send_time = now_ms;
        }
        self.outbound_queue.mark_sent(first, last);
    }

    /// 送信パケットの `last_received_id` に載せる ID
    ///
    /// まだ何も受け付けていなければ無効 ID。
    pub fn last_received_id(&self) -> SequenceId {
        if self.received_any {
            self.next_in_seq.previous()
        } else {
            SequenceId::INVALID
        }
    }

    /// 受信した信頼メッセージの ID を受け付けるか判定し、受け付けたら期待値を進める
    pub fn accept_inbound(&mut self, seq_id: SequenceId) -> bool {
        if seq_id != self.next_in_seq {
            return false;
        }
        self.next_in_seq = seq_id.next();
        self.received_any = true;
        true
    }
}
