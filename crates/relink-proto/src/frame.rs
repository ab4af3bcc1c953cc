//! サブメッセージのフレーミング
//!
//! ## Frame Wire Format
//! ```text
//! [kind: u8]
//! [length: u16 LE]   ← タグバイトを含む本体の長さ
//! [tag: u8]          ← タグ（0 以外）が指定されたときのみ
//! [payload: variable]
//! ```
//!
//! タグの有無はワイヤ上で区別されない。受信側では本体の先頭バイトをタグとして
//! 扱うかどうかはアプリケーション層の取り決めになる（[`SubMessage::split_tag`]）。

use heapless::Vec;

use crate::error::WireError;
use crate::kind::MessageKind;

/// フレームヘッダー長（kind: 1 + length: 2）
pub const FRAME_OVERHEAD: usize = 3;

/// タグを付けない場合の値
pub const NO_TAG: u8 = 0;

/// フレーム化したときの総バイト数
pub fn framed_len(payload_len: usize, tag: u8) -> usize {
    FRAME_OVERHEAD + body_len(payload_len, tag)
}

/// 長さフィールドに入る本体の長さ（タグ込み）
pub fn body_len(payload_len: usize, tag: u8) -> usize {
    payload_len + if tag != NO_TAG { 1 } else { 0 }
}

/// `out` の末尾にフレームを 1 つ追記する
///
/// 失敗したときは `out` を一切変更しない。
///
/// # 戻り値
/// 追記したバイト数
///
/// # エラー
/// - `WireError::PayloadTooLong`: 本体が u16 を超える
/// - `WireError::BufferFull`: `out` の空き容量不足
pub fn write_frame<const N: usize>(
    out: &mut Vec<u8, N>,
    kind: u8,
    tag: u8,
    payload: &[u8],
) -> Result<usize, WireError> {
    let body = body_len(payload.len(), tag);
    let length = u16::try_from(body).map_err(|_| WireError::PayloadTooLong)?;
    let total = FRAME_OVERHEAD + body;

    if out.capacity() - out.len() < total {
        return Err(WireError::BufferFull);
    }

    // 事前に容量を確認済みなので以降の追記は失敗しない
    let mut head = [0u8; FRAME_OVERHEAD + 1];
    head[0] = kind;
    head[1..3].copy_from_slice(&length.to_le_bytes());
    let head_len = if tag != NO_TAG {
        head[3] = tag;
        FRAME_OVERHEAD + 1
    } else {
        FRAME_OVERHEAD
    };

    out.extend_from_slice(&head[..head_len])
        .map_err(|_| WireError::BufferFull)?;
    out.extend_from_slice(payload)
        .map_err(|_| WireError::BufferFull)?;

    Ok(total)
}

/// パース済みサブメッセージ（受信バッファを借用する）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMessage<'a> {
    /// 種別（生の u8）
    pub kind: u8,
    /// 本体（タグがあればタグを含む）
    pub body: &'a [u8],
}

impl<'a> SubMessage<'a> {
    /// 種別を既知の値として返す
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::try_from(self.kind).ok()
    }

    /// シーケンス ID を消費するサブメッセージか
    pub fn is_counted(&self) -> bool {
        !MessageKind::raw_is_always_unreliable(self.kind)
    }

    /// 本体の先頭をタグとして切り出す
    pub fn split_tag(&self) -> Option<(u8, &'a [u8])> {
        self.body.split_first().map(|(tag, rest)| (*tag, rest))
    }

    /// フレーム化したときの総バイト数
    pub fn framed_len(&self) -> usize {
        FRAME_OVERHEAD + self.body.len()
    }
}

/// パケット本体（ヘッダー以降）からサブメッセージを順に取り出すイテレータ
///
/// 壊れたフレームに出会ったら `Err(WireError::FrameOverrun)` を 1 回返し、以降は `None`。
pub struct FrameIter<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FrameIter<'a> {
    /// 新しいイテレータを生成する
    pub fn new(bytes: &'a [u8]) -> Self {
        FrameIter { bytes, offset: 0 }
    }
}

impl<'a> Iterator for FrameIter<'a> {
    type Item = Result<SubMessage<'a>, WireError>;

    fn next(&mut self) -> Option<Self::Item> {
        let bytes: &'a [u8] = self.bytes;
        let remaining = &bytes[self.offset..];
        if remaining.is_empty() {
            return None;
        }

        if remaining.len() < FRAME_OVERHEAD {
            self.offset = self.bytes.len();
            return Some(Err(WireError::FrameOverrun));
        }

        let kind = remaining[0];
        let length = u16::from_le_bytes([remaining[1], remaining[2]]) as usize;
        let end = FRAME_OVERHEAD + length;
        if end > remaining.len() {
            self.offset = self.bytes.len();
            return Some(Err(WireError::FrameOverrun));
        }

        self.offset += end;
        Some(Ok(SubMessage {
            kind,
            body: &remaining[FRAME_OVERHEAD..end],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_frame_without_tag() {
        let mut out: Vec<u8, 16> = Vec::new();
        let written = write_frame(&mut out, MessageKind::SingleReliable.raw(), NO_TAG, &[1, 2, 3]).unwrap();
        assert_eq!(written, 6);
        assert_eq!(out.as_slice(), &[4, 3, 0, 1, 2, 3]);
    }

    #[test]
    fn test_write_frame_with_tag_counts_tag_in_length() {
        let mut out: Vec<u8, 16> = Vec::new();
        let written = write_frame(&mut out, MessageKind::SingleReliable.raw(), 0x42, &[1, 2]).unwrap();
        assert_eq!(written, 6);
        assert_eq!(out.as_slice(), &[4, 3, 0, 0x42, 1, 2]);
    }

    #[test]
    fn test_write_frame_full_buffer_untouched() {
        let mut out: Vec<u8, 5> = Vec::new();
        out.push(0xEE).unwrap();
        let result = write_frame(&mut out, MessageKind::Ping.raw(), NO_TAG, &[1, 2]);
        assert_eq!(result, Err(WireError::BufferFull));
        assert_eq!(out.as_slice(), &[0xEE]); // 部分書き込みなし
    }

    #[test]
    fn test_frame_iter_multiple() {
        let mut out: Vec<u8, 32> = Vec::new();
        write_frame(&mut out, MessageKind::ConnectionRequest.raw(), NO_TAG, &[]).unwrap();
        write_frame(&mut out, MessageKind::Ping.raw(), NO_TAG, &[9; 8]).unwrap();
        write_frame(&mut out, MessageKind::SingleReliable.raw(), 7, b"hi").unwrap();

        let frames: std::vec::Vec<_> = FrameIter::new(&out).collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].kind(), Some(MessageKind::ConnectionRequest));
        assert!(frames[0].body.is_empty());
        assert!(!frames[1].is_counted());
        assert_eq!(frames[2].split_tag(), Some((7, b"hi".as_slice())));
    }

    #[test]
    fn test_frame_iter_overrun() {
        // 長さ 10 と宣言しているが本体は 2 バイト
        let bytes = [4u8, 10, 0, 1, 2];
        let mut iter = FrameIter::new(&bytes);
        assert_eq!(iter.next(), Some(Err(WireError::FrameOverrun)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn test_frame_iter_trailing_garbage() {
        let bytes = [5u8, 0, 0, 0xAA];
        let mut iter = FrameIter::new(&bytes);
        assert!(matches!(iter.next(), Some(Ok(_))));
        assert_eq!(iter.next(), Some(Err(WireError::FrameOverrun)));
        assert_eq!(iter.next(), None);
    }
}
