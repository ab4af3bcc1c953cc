//! パケットヘッダー
//!
//! ## Wire Format
//! ```text
//! [prefix: 'R' 'E' 0x01 (3 bytes)]
//! [class: u8]
//! [seq_id_min: u16 LE]
//! [seq_id_max: u16 LE]
//! [last_received_id: u16 LE]
//! ```

use crate::error::WireError;
use crate::kind::MessageKind;
use crate::seq::SequenceId;

/// リンクプレフィックス（"Reliable Transport Layer 1"）
pub const PACKET_PREFIX: [u8; 3] = [b'R', b'E', 0x01];

/// 固定ヘッダー長
pub const HEADER_LEN: usize = 10;

/// パケットヘッダー
///
/// `seq_id_min..=seq_id_max` はパケットに含まれる信頼サブメッセージの範囲。
/// 信頼サブメッセージを含まない場合は両方 `SequenceId::INVALID`。
/// `last_received_id` は送信側が受信済みの最新 ID（累積 ACK のピギーバック）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// メッセージクラス（生の u8、未知の値もそのまま保持する）
    pub class: u8,
    /// 含まれる信頼サブメッセージの先頭 ID
    pub seq_id_min: SequenceId,
    /// 含まれる信頼サブメッセージの末尾 ID
    pub seq_id_max: SequenceId,
    /// 累積 ACK
    pub last_received_id: SequenceId,
}

impl PacketHeader {
    /// 新しいヘッダーを構築する
    pub fn new(
        class: MessageKind,
        seq_id_min: SequenceId,
        seq_id_max: SequenceId,
        last_received_id: SequenceId,
    ) -> Self {
        PacketHeader {
            class: class.raw(),
            seq_id_min,
            seq_id_max,
            last_received_id,
        }
    }

    /// 受信バイト列の先頭からヘッダーをパースする
    ///
    /// # エラー
    /// - `WireError::TooShort`: 10 バイト未満
    /// - `WireError::BadPrefix`: プレフィックス不一致
    pub fn parse(bytes: &[u8]) -> Result<Self, WireError> {
        if bytes.len() < HEADER_LEN {
            return Err(WireError::TooShort);
        }
        if bytes[0..3] != PACKET_PREFIX {
            return Err(WireError::BadPrefix);
        }

        Ok(PacketHeader {
            class: bytes[3],
            seq_id_min: SequenceId(u16::from_le_bytes([bytes[4], bytes[5]])),
            seq_id_max: SequenceId(u16::from_le_bytes([bytes[6], bytes[7]])),
            last_received_id: SequenceId(u16::from_le_bytes([bytes[8], bytes[9]])),
        })
    }

    /// ヘッダーを `out` の先頭 10 バイトに書き込む
    ///
    /// 送信ステージングバッファのヘッダーをフラッシュ直前に上書きするのに使う。
    pub fn write_to(&self, out: &mut [u8]) -> Result<(), WireError> {
        if out.len() < HEADER_LEN {
            return Err(WireError::BufferFull);
        }
        out[0..3].copy_from_slice(&PACKET_PREFIX);
        out[3] = self.class;
        out[4..6].copy_from_slice(&self.seq_id_min.0.to_le_bytes());
        out[6..8].copy_from_slice(&self.seq_id_max.0.to_le_bytes());
        out[8..10].copy_from_slice(&self.last_received_id.0.to_le_bytes());
        Ok(())
    }

    /// ヘッダーをバイト配列に変換する
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        // 長さは常に足りている
        let _ = self.write_to(&mut bytes);
        bytes
    }

    /// クラスを既知の種別として返す
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::try_from(self.class).ok()
    }

    /// 信頼サブメッセージの範囲を持つか
    pub fn has_reliable_range(&self) -> bool {
        self.seq_id_min.is_valid() || self.seq_id_max.is_valid()
    }
}
