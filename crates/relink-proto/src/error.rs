//! relink-proto エラー型

/// ワイヤフォーマットのエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// パケットが固定ヘッダーより短い
    TooShort,
    /// リンクプレフィックス（マジックバイト）が一致しない
    BadPrefix,
    /// サブメッセージの宣言長が残りバイト数を超えている
    FrameOverrun,
    /// 書き込み先バッファの空き容量が足りない
    BufferFull,
    /// ペイロードが長さフィールド（u16）で表現できない
    PayloadTooLong,
}

impl core::fmt::Display for WireError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WireError::TooShort => write!(f, "Packet shorter than header"),
            WireError::BadPrefix => write!(f, "Packet has wrong link prefix"),
            WireError::FrameOverrun => write!(f, "Sub-message length exceeds remaining bytes"),
            WireError::BufferFull => write!(f, "Output buffer full"),
            WireError::PayloadTooLong => write!(f, "Payload too long for length field"),
        }
    }
}
