//! メッセージ種別
//!
//! ヘッダーのメッセージクラスとサブメッセージの種別は同じ 1 バイト空間を共有する。
//! `Multiple*` はヘッダー専用で、サブメッセージとして埋め込まれることはない。

/// メッセージ種別（ワイヤ上の 1 バイト）
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// 接続要求
    ConnectionRequest = 1,
    /// 接続応答（応答側が送る）
    ConnectionResponse = 2,
    /// 切断要求
    DisconnectRequest = 3,
    /// 信頼データ（アプリケーション層へ転送）
    SingleReliable = 4,
    /// 非信頼データ（再送されない）
    SingleUnreliable = 5,
    /// 分割メッセージ（未サポート、受信時はエラー報告）
    MultiPart = 6,
    /// 信頼サブメッセージのみを含むパケット
    MultipleReliable = 7,
    /// 非信頼サブメッセージのみを含むパケット
    MultipleUnreliable = 8,
    /// 信頼・非信頼が混在するパケット
    MultipleMixed = 9,
    /// ヘッダーのみの ACK パケット
    Ack = 10,
    /// Ping（相手は同じペイロードを PingEcho で返す）
    Ping = 11,
    /// Ping への応答
    PingEcho = 12,
}

impl MessageKind {
    /// 常に非信頼で送られる種別か（シーケンス ID を消費しない）
    pub fn is_always_unreliable(&self) -> bool {
        matches!(
            self,
            MessageKind::SingleUnreliable | MessageKind::Ack | MessageKind::Ping | MessageKind::PingEcho
        )
    }

    /// 複数サブメッセージを含むパケットクラスか
    pub fn is_multiple(&self) -> bool {
        matches!(
            self,
            MessageKind::MultipleReliable | MessageKind::MultipleUnreliable | MessageKind::MultipleMixed
        )
    }

    /// 生の u8 値を返す
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// 生バイトが常に非信頼な種別か（未知の値は信頼扱い）
    pub fn raw_is_always_unreliable(raw: u8) -> bool {
        MessageKind::try_from(raw)
            .map(|kind| kind.is_always_unreliable())
            .unwrap_or(false)
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageKind::ConnectionRequest),
            2 => Ok(MessageKind::ConnectionResponse),
            3 => Ok(MessageKind::DisconnectRequest),
            4 => Ok(MessageKind::SingleReliable),
            5 => Ok(MessageKind::SingleUnreliable),
            6 => Ok(MessageKind::MultiPart),
            7 => Ok(MessageKind::MultipleReliable),
            8 => Ok(MessageKind::MultipleUnreliable),
            9 => Ok(MessageKind::MultipleMixed),
            10 => Ok(MessageKind::Ack),
            11 => Ok(MessageKind::Ping),
            12 => Ok(MessageKind::PingEcho),
            other => Err(other),
        }
    }
}
