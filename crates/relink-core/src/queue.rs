//! 未 ACK 信頼メッセージのキュー
//!
//! エントリ（シーケンス ID と長さ）は固定容量のリングに、フレーム化済みのバイト列は
//! 固定容量のバイト領域に、どちらも送信順で格納する。
//! 先頭から ACK 済みのものを取り除くと、残りのバイト列は領域の先頭へ詰め直される。
//!
//! 連続するエントリのバイト列は領域上でも連続しているので、再送時は
//! 範囲をそのままステージングバッファへコピーできる。

use heapless::{Deque, Vec};
use relink_proto::{framed_len, write_frame, MessageKind, SequenceId};

use crate::error::QueueError;

/// 未 ACK キューの 1 エントリ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMessage {
    /// 割り当て済みシーケンス ID
    pub seq_id: SequenceId,
    /// 種別
    pub kind: MessageKind,
    /// フレーム化後の長さ（フレームヘッダー込み）
    pub framed_len: u16,
    /// 一度でもリンクへ送られたか
    pub sent: bool,
}

/// キュー上で連続するエントリの範囲（1 パケット分）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRun<'a> {
    /// 範囲内で最も古い ID
    pub first: SequenceId,
    /// 範囲内で最も新しい ID
    pub last: SequenceId,
    /// エントリ数
    pub count: usize,
    /// フレーム化済みバイト列（送信順）
    pub bytes: &'a [u8],
}

/// 未 ACK キュー
pub struct OutboundQueue<const DEPTH: usize, const REGION: usize> {
    entries: Deque<PendingMessage, DEPTH>,
    region: Vec<u8, REGION>,
}

impl<const DEPTH: usize, const REGION: usize> OutboundQueue<DEPTH, REGION> {
    /// 空のキューを生成する
    pub const fn new() -> Self {
        OutboundQueue {
            entries: Deque::new(),
            region: Vec::new(),
        }
    }

    /// メッセージをフレーム化して末尾に追加する
    ///
    /// 失敗したときはキューを一切変更しない。ID の割り当ては呼び出し側が行う。
    ///
    /// # エラー
    /// - `QueueError::QueueFull`: エントリ数上限
    /// - `QueueError::RegionFull`: バイト領域の空き不足
    pub fn push(
        &mut self,
        seq_id: SequenceId,
        kind: MessageKind,
        tag: u8,
        payload: &[u8],
    ) -> Result<(), QueueError> {
        if self.entries.is_full() {
            return Err(QueueError::QueueFull);
        }

        let encoded_len =
            u16::try_from(framed_len(payload.len(), tag)).map_err(|_| QueueError::PayloadTooLarge)?;

        // write_frame は容量不足なら何も書かない
        let written = write_frame(&mut self.region, kind.raw(), tag, payload)
            .map_err(|_| QueueError::RegionFull)?;

        if self
            .entries
            .push_back(PendingMessage {
                seq_id,
                kind,
                framed_len: encoded_len,
                sent: false,
            })
            .is_err()
        {
            // 領域への追記を取り消す
            let len = self.region.len() - written;
            self.region.truncate(len);
            return Err(QueueError::QueueFull);
        }
        Ok(())
    }

    /// `ack_id` までのエントリを先頭から取り除く
    ///
    /// `ack_id` がキューの ID 範囲外（古い ACK、無効 ID）の場合は何もしない。
    ///
    /// # 戻り値
    /// 取り除いたエントリ数
    pub fn acknowledge_through(&mut self, ack_id: SequenceId) -> usize {
        let (first, last) = match (self.entries.front(), self.entries.back()) {
            (Some(first), Some(last)) => (first.seq_id, last.seq_id),
            _ => return 0,
        };
        if !SequenceId::in_range(ack_id, first, last) {
            return 0;
        }

        let mut retired = 0;
        let mut retired_bytes = 0;
        while let Some(entry) = self.entries.pop_front() {
            retired += 1;
            retired_bytes += entry.framed_len as usize;
            if entry.seq_id == ack_id {
                break;
            }
        }

        // 残りのバイト列を先頭へ詰める
        let remaining = self.region.len() - retired_bytes;
        self.region.copy_within(retired_bytes.., 0);
        self.region.truncate(remaining);

        retired
    }

    /// 先頭から `skip` 件飛ばした位置から、`budget` バイトに収まるだけの範囲を返す
    ///
    /// `skip == 0` なら最も古いエントリから始まる。
    pub fn run_from(&self, skip: usize, budget: usize) -> Option<PendingRun<'_>> {
        let start: usize = self
            .entries
            .iter()
            .take(skip)
            .map(|entry| entry.framed_len as usize)
            .sum();

        let mut count = 0;
        let mut bytes = 0;
        let mut first = SequenceId::INVALID;
        let mut last = SequenceId::INVALID;
        for entry in self.entries.iter().skip(skip) {
            let len = entry.framed_len as usize;
            if bytes + len > budget {
                break;
            }
            if count == 0 {
                first = entry.seq_id;
            }
            bytes += len;
            count += 1;
            last = entry.seq_id;
        }

        if count == 0 {
            return None;
        }
        Some(PendingRun {
            first,
            last,
            count,
            bytes: &self.region[start..start + bytes],
        })
    }

    /// 末尾（最も新しいエントリ）から遡って `budget` バイトに収まるだけの範囲を返す
    pub fn newest_run(&self, budget: usize) -> Option<PendingRun<'_>> {
        let mut count = 0;
        let mut bytes = 0;
        let mut first = SequenceId::INVALID;
        for entry in self.entries.iter().rev() {
            let len = entry.framed_len as usize;
            if bytes + len > budget {
                break;
            }
            bytes += len;
            count += 1;
            first = entry.seq_id;
        }

        let last = self.entries.back()?.seq_id;
        if count == 0 {
            return None;
        }
        let start = self.region.len() - bytes;
        Some(PendingRun {
            first,
            last,
            count,
            bytes: &self.region[start..],
        })
    }

    /// `first..=last` の範囲のエントリを送信済みにする
    pub fn mark_sent(&mut self, first: SequenceId, last: SequenceId) {
        for entry in self.entries.iter_mut() {
            if SequenceId::in_range(entry.seq_id, first, last) {
                entry.sent = true;
            }
        }
    }

    /// まだ一度も送っていない最初のエントリの位置
    pub fn first_unsent(&self) -> Option<usize> {
        self.entries.iter().position(|entry| !entry.sent)
    }

    /// 保持しているエントリを先頭から返す
    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.entries.iter()
    }

    /// 先頭エントリ
    pub fn front(&self) -> Option<&PendingMessage> {
        self.entries.front()
    }

    /// エントリ数
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 空か
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// バイト領域の使用量
    pub fn region_len(&self) -> usize {
        self.region.len()
    }

    /// すべて破棄する（領域は再確保しない）
    pub fn clear(&mut self) {
        self.entries.clear();
        self.region.clear();
    }
}

impl<const DEPTH: usize, const REGION: usize> Default for OutboundQueue<DEPTH, REGION> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relink_proto::NO_TAG;

    type SmallQueue = OutboundQueue<4, 64>;

    fn push_n(queue: &mut SmallQueue, start: u16, n: u16) {
        for i in 0..n {
            queue
                .push(SequenceId(start + i), MessageKind::SingleReliable, NO_TAG, &[i as u8; 4])
                .unwrap();
        }
    }

    #[test]
    fn test_push_and_full() {
        let mut queue = SmallQueue::new();
        push_n(&mut queue, 1, 4);
        assert_eq!(queue.len(), 4);

        let result = queue.push(SequenceId(5), MessageKind::SingleReliable, NO_TAG, &[0; 4]);
        assert_eq!(result, Err(QueueError::QueueFull));
        assert_eq!(queue.len(), 4, "失敗時にキューは変化しない");
        assert_eq!(queue.region_len(), 4 * framed_len(4, NO_TAG));
    }

    #[test]
    fn test_region_full_leaves_queue_untouched() {
        let mut queue = SmallQueue::new();
        queue
            .push(SequenceId(1), MessageKind::SingleReliable, NO_TAG, &[0; 50])
            .unwrap();
        let before = queue.region_len();

        let result = queue.push(SequenceId(2), MessageKind::SingleReliable, NO_TAG, &[0; 20]);
        assert_eq!(result, Err(QueueError::RegionFull));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.region_len(), before);
    }

    #[test]
    fn test_acknowledge_through_compacts_region() {
        let mut queue = SmallQueue::new();
        push_n(&mut queue, 1, 3);

        assert_eq!(queue.acknowledge_through(SequenceId(2)), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().seq_id, SequenceId(3));
        // 残ったエントリのフレームが領域の先頭にある
        assert_eq!(queue.region_len(), framed_len(4, NO_TAG));
        let run = queue.run_from(0, 64).unwrap();
        assert_eq!(run.bytes[0], MessageKind::SingleReliable.raw());
        assert_eq!(&run.bytes[3..], &[2, 2, 2, 2]);
    }

    #[test]
    fn test_acknowledge_outside_range_is_noop() {
        let mut queue = SmallQueue::new();
        push_n(&mut queue, 10, 3);

        assert_eq!(queue.acknowledge_through(SequenceId(9)), 0, "古い ACK は無視");
        assert_eq!(queue.acknowledge_through(SequenceId(13)), 0, "未送信 ID の ACK は無視");
        assert_eq!(queue.acknowledge_through(SequenceId::INVALID), 0);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_acknowledge_across_wrap() {
        let mut queue = SmallQueue::new();
        queue
            .push(SequenceId(0xFFFD), MessageKind::SingleReliable, NO_TAG, &[1])
            .unwrap();
        queue
            .push(SequenceId::MAX, MessageKind::SingleReliable, NO_TAG, &[2])
            .unwrap();
        queue
            .push(SequenceId::MIN, MessageKind::SingleReliable, NO_TAG, &[3])
            .unwrap();

        assert_eq!(queue.acknowledge_through(SequenceId::MAX), 2);
        assert_eq!(queue.front().unwrap().seq_id, SequenceId::MIN);
        assert_eq!(queue.acknowledge_through(SequenceId::MIN), 1);
        assert!(queue.is_empty());
        assert_eq!(queue.region_len(), 0);
    }

    #[test]
    fn test_mark_sent_and_first_unsent() {
        let mut queue = SmallQueue::new();
        push_n(&mut queue, 1, 4);
        assert_eq!(queue.first_unsent(), Some(0));

        queue.mark_sent(SequenceId(1), SequenceId(2));
        assert_eq!(queue.first_unsent(), Some(2));

        queue.acknowledge_through(SequenceId(1));
        assert_eq!(queue.first_unsent(), Some(1), "ACK で先頭が抜けると位置も詰まる");

        queue.mark_sent(SequenceId(3), SequenceId(4));
        assert_eq!(queue.first_unsent(), None);
    }

    #[test]
    fn test_runs_respect_budget() {
        let mut queue = SmallQueue::new();
        push_n(&mut queue, 1, 4); // 各 7 バイト

        let oldest = queue.run_from(0, 15).unwrap();
        assert_eq!((oldest.first, oldest.last, oldest.count), (SequenceId(1), SequenceId(2), 2));
        assert_eq!(oldest.bytes.len(), 14);

        let newest = queue.newest_run(15).unwrap();
        assert_eq!((newest.first, newest.last, newest.count), (SequenceId(3), SequenceId(4), 2));
        assert_eq!(&newest.bytes[3..7], &[2, 2, 2, 2]);

        let middle = queue.run_from(1, 15).unwrap();
        assert_eq!((middle.first, middle.last, middle.count), (SequenceId(2), SequenceId(3), 2));
        assert_eq!(&middle.bytes[3..7], &[1, 1, 1, 1], "領域上の位置も飛ばした分だけずれる");
        assert!(queue.run_from(4, 64).is_none());

        assert!(queue.run_from(0, 6).is_none(), "1 件も入らなければ None");
        assert!(SmallQueue::new().newest_run(64).is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use relink_proto::NO_TAG;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// 追加と ACK をどう混ぜても、領域の使用量はエントリ長の合計と一致する
        #[test]
        fn region_matches_entries(
            ops in proptest::collection::vec((any::<bool>(), 0usize..40, 0u16..6), 1..80),
            start in 1u16..=u16::MAX - 1,
        ) {
            let mut queue: OutboundQueue<8, 256> = OutboundQueue::new();
            let mut next = SequenceId(start);

            for (push, len, ack_back) in ops {
                if push {
                    let payload = std::vec![len as u8; len];
                    if queue.push(next, MessageKind::SingleReliable, NO_TAG, &payload).is_ok() {
                        next = next.next();
                    }
                } else if let Some(last) = queue.iter().last().copied() {
                    // 末尾から ack_back 個戻った ID を ACK する
                    let mut ack = last.seq_id;
                    for _ in 0..ack_back {
                        ack = ack.previous();
                    }
                    queue.acknowledge_through(ack);
                }

                let total: usize = queue.iter().map(|entry| entry.framed_len as usize).sum();
                prop_assert_eq!(queue.region_len(), total);
                prop_assert!(queue.len() <= 8);

                // ID は連続している
                let ids: std::vec::Vec<SequenceId> = queue.iter().map(|entry| entry.seq_id).collect();
                for pair in ids.windows(2) {
                    prop_assert_eq!(pair[0].next(), pair[1]);
                }
            }
        }
    }
}
