//! 送信ステージングバッファ
//!
//! 次に送るパケットを組み立てる MTU サイズのバッファ。先頭 [`HEADER_LEN`] バイトは
//! ヘッダー用に空けておき、フラッシュ直前に書き込む。
//!
//! 信頼サブメッセージは未 ACK キュー上で連続する 1 つの範囲だけを保持する。
//! そのため受信側はヘッダーの `seq_id_min` から順に ID を割り当てられる。

use heapless::Vec;
use relink_proto::{write_frame, MessageKind, PacketHeader, SequenceId, WireError, HEADER_LEN};

use crate::queue::PendingRun;

/// 送信ステージングバッファ
pub struct TxStaging<const MTU: usize> {
    buf: Vec<u8, MTU>,
    reliable: Option<(SequenceId, SequenceId)>,
    unreliable_count: usize,
}

impl<const MTU: usize> TxStaging<MTU> {
    /// 空のステージングバッファを生成する
    pub fn new() -> Self {
        let mut staging = TxStaging {
            buf: Vec::new(),
            reliable: None,
            unreliable_count: 0,
        };
        staging.reset();
        staging
    }

    /// 組み立て中の内容を破棄する
    pub fn reset(&mut self) {
        self.buf.clear();
        // MTU >= HEADER_LEN は Transport::new で検証済み
        let _ = self.buf.resize(HEADER_LEN.min(MTU), 0);
        self.reliable = None;
        self.unreliable_count = 0;
    }

    /// 追記できる残りバイト数
    pub fn remaining(&self) -> usize {
        MTU - self.buf.len()
    }

    /// サブメッセージを 1 つも保持していないか
    pub fn is_empty(&self) -> bool {
        self.reliable.is_none() && self.unreliable_count == 0
    }

    /// 信頼範囲を保持しているか
    pub fn has_reliable(&self) -> bool {
        self.reliable.is_some()
    }

    /// 保持している信頼範囲
    pub fn reliable_range(&self) -> Option<(SequenceId, SequenceId)> {
        self.reliable
    }

    /// 保持している非信頼サブメッセージ数
    pub fn unreliable_count(&self) -> usize {
        self.unreliable_count
    }

    /// ヘッダーを除いた本体の長さ
    pub fn body_len(&self) -> usize {
        self.buf.len().saturating_sub(HEADER_LEN)
    }

    /// 非信頼サブメッセージを 1 つ追記する
    ///
    /// # エラー
    /// - `WireError::BufferFull`: 空き不足（バッファは変化しない）
    pub fn push_unreliable(&mut self, kind: MessageKind, tag: u8, payload: &[u8]) -> Result<(), WireError> {
        write_frame(&mut self.buf, kind.raw(), tag, payload)?;
        self.unreliable_count += 1;
        Ok(())
    }

    /// 未 ACK キューの連続範囲をそのまま追記する
    ///
    /// # 戻り値
    /// 追記したら `true`。既に信頼範囲を保持している、または空き不足なら `false`。
    pub fn push_reliable_run(&mut self, run: &PendingRun<'_>) -> bool {
        if self.reliable.is_some() || run.count == 0 {
            return false;
        }
        if self.buf.extend_from_slice(run.bytes).is_err() {
            return false;
        }
        self.reliable = Some((run.first, run.last));
        true
    }

    /// パケットのクラス
    ///
    /// 常に Multiple* クラスで送る。サブメッセージがなければヘッダーのみの ACK。
    pub fn class(&self) -> MessageKind {
        match (self.reliable.is_some(), self.unreliable_count > 0) {
            (true, true) => MessageKind::MultipleMixed,
            (true, false) => MessageKind::MultipleReliable,
            (false, true) => MessageKind::MultipleUnreliable,
            (false, false) => MessageKind::Ack,
        }
    }

    /// ヘッダーを書き込み、送信可能なパケットを返す
    pub fn finalize(&mut self, last_received_id: SequenceId) -> &[u8] {
        let (min, max) = self
            .reliable
            .unwrap_or((SequenceId::INVALID, SequenceId::INVALID));
        let header = PacketHeader::new(self.class(), min, max, last_received_id);
        // 先頭 HEADER_LEN バイトは reset で確保済み
        let _ = header.write_to(&mut self.buf);
        &self.buf
    }
}

impl<const MTU: usize> Default for TxStaging<MTU> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OutboundQueue;
    use relink_proto::{FrameIter, NO_TAG};

    #[test]
    fn test_empty_finalizes_to_ack() {
        let mut staging: TxStaging<64> = TxStaging::new();
        assert!(staging.is_empty());
        let packet = staging.finalize(SequenceId(7));
        assert_eq!(packet.len(), HEADER_LEN);

        let header = PacketHeader::parse(packet).unwrap();
        assert_eq!(header.kind(), Some(MessageKind::Ack));
        assert_eq!(header.seq_id_min, SequenceId::INVALID);
        assert_eq!(header.last_received_id, SequenceId(7));
    }

    #[test]
    fn test_mixed_packet() {
        let mut queue: OutboundQueue<4, 64> = OutboundQueue::new();
        queue.push(SequenceId(3), MessageKind::SingleReliable, NO_TAG, b"a").unwrap();
        queue.push(SequenceId(4), MessageKind::SingleReliable, NO_TAG, b"b").unwrap();

        let mut staging: TxStaging<64> = TxStaging::new();
        staging.push_unreliable(MessageKind::Ping, NO_TAG, &[0; 8]).unwrap();
        assert!(staging.push_reliable_run(&queue.run_from(0, 64).unwrap()));
        assert!(
            !staging.push_reliable_run(&queue.run_from(0, 64).unwrap()),
            "信頼範囲は 1 つだけ"
        );
        assert_eq!(staging.class(), MessageKind::MultipleMixed);

        let packet = staging.finalize(SequenceId::INVALID);
        let header = PacketHeader::parse(packet).unwrap();
        assert_eq!((header.seq_id_min, header.seq_id_max), (SequenceId(3), SequenceId(4)));

        let kinds: std::vec::Vec<u8> = FrameIter::new(&packet[HEADER_LEN..])
            .map(|frame| frame.unwrap().kind)
            .collect();
        assert_eq!(kinds, [11, 4, 4]);
    }

    #[test]
    fn test_push_unreliable_overflow() {
        let mut staging: TxStaging<16> = TxStaging::new();
        assert_eq!(staging.remaining(), 6);
        assert_eq!(
            staging.push_unreliable(MessageKind::SingleUnreliable, NO_TAG, &[0; 4]),
            Err(WireError::BufferFull)
        );
        assert!(staging.is_empty());
        staging.push_unreliable(MessageKind::SingleUnreliable, NO_TAG, &[0; 3]).unwrap();
        assert_eq!(staging.remaining(), 0);
        assert_eq!(staging.class(), MessageKind::MultipleUnreliable);
    }

    #[test]
    fn test_reset_clears_content() {
        let mut staging: TxStaging<32> = TxStaging::new();
        staging.push_unreliable(MessageKind::Ping, NO_TAG, &[1; 8]).unwrap();
        staging.reset();
        assert!(staging.is_empty());
        assert_eq!(staging.body_len(), 0);
        assert_eq!(staging.remaining(), 32 - HEADER_LEN);
    }
}
