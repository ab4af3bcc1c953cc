//! ユニットテスト用のリンクとハンドラ

use heapless::Vec as HVec;
use relink_proto::{write_frame, MessageKind, PacketHeader, SequenceId, HEADER_LEN};

use crate::config::TransportConfig;
use crate::connection::ConnectionState;
use crate::link::{Handler, Link};
use crate::transport::Transport;

pub const TEST_MTU: usize = 128;

pub type TestTransport = Transport<RecordingLink, RecordingHandler, TEST_MTU, 4, 512>;

/// 送ったパケットを記録するリンク
#[derive(Debug)]
pub struct RecordingLink {
    pub sent: Vec<Vec<u8>>,
    pub accept: bool,
}

impl Default for RecordingLink {
    fn default() -> Self {
        RecordingLink {
            sent: Vec::new(),
            accept: true,
        }
    }
}

impl Link for RecordingLink {
    fn send_packet(&mut self, packet: &[u8]) -> bool {
        if self.accept {
            self.sent.push(packet.to_vec());
        }
        self.accept
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ConnectionRequested,
    Connected,
    Disconnected,
    Data(Vec<u8>),
}

/// 受け取ったイベントを記録するハンドラ
#[derive(Debug, Default)]
pub struct RecordingHandler {
    pub events: Vec<Event>,
}

impl Handler for RecordingHandler {
    fn on_connection_requested(&mut self) {
        self.events.push(Event::ConnectionRequested);
    }

    fn on_connected(&mut self) {
        self.events.push(Event::Connected);
    }

    fn on_disconnected(&mut self) {
        self.events.push(Event::Disconnected);
    }

    fn on_data_received(&mut self, payload: &[u8]) {
        self.events.push(Event::Data(payload.to_vec()));
    }
}

pub fn transport(now_ms: u64) -> TestTransport {
    TestTransport::new(
        RecordingLink::default(),
        RecordingHandler::default(),
        TransportConfig::default(),
        now_ms,
    )
    .unwrap()
}

/// 接続済み状態のトランスポート
pub fn connected(now_ms: u64) -> TestTransport {
    let mut transport = transport(now_ms);
    transport.state = ConnectionState::Connected;
    transport
}

pub fn frame(kind: u8, payload: &[u8]) -> (u8, &[u8]) {
    (kind, payload)
}

/// 手組みのパケットを作る
pub fn build_packet(
    class: MessageKind,
    min: SequenceId,
    max: SequenceId,
    last_received: SequenceId,
    frames: &[(u8, &[u8])],
) -> Vec<u8> {
    let mut body: HVec<u8, 1024> = HVec::new();
    for (kind, payload) in frames {
        write_frame(&mut body, *kind, 0, payload).unwrap();
    }
    let mut packet = PacketHeader::new(class, min, max, last_received).to_bytes().to_vec();
    packet.extend_from_slice(&body);
    packet
}

/// 送信済みパケットをヘッダーと本体に分ける
pub fn parse_sent(transport: &TestTransport) -> Vec<(PacketHeader, Vec<u8>)> {
    transport
        .link()
        .sent
        .iter()
        .map(|packet| {
            let header = PacketHeader::parse(packet).unwrap();
            (header, packet[HEADER_LEN..].to_vec())
        })
        .collect()
}
