//! イベントメールボックス
//!
//! トランスポートからの通知をバッファし、アプリケーションがポーリングで取り出す。
//! 送受信したデータのバイト数も数える。

use std::collections::VecDeque;

use relink_core::Handler;

/// トランスポートからアプリケーションへのイベント
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// 相手から接続要求を受信した
    ConnectionRequested,
    /// 接続が確立した
    Connected,
    /// 相手が切断した
    Disconnected,
    /// 受信がなく接続がタイムアウトした
    TimedOut,
    /// データを受信した
    Data(Vec<u8>),
}

/// イベントバッファ（`Handler` 実装）
#[derive(Debug, Default)]
pub struct Mailbox {
    /// 未取得のイベント
    events: VecDeque<LinkEvent>,
    /// 受信したデータの累計バイト数
    total_received_bytes: u64,
    /// 送信したデータの累計バイト数
    total_sent_bytes: u64,
}

impl Mailbox {
    /// 空のメールボックスを生成する
    pub fn new() -> Self {
        Self::default()
    }

    /// イベントを追加する（トランスポート外で発生したもの）
    pub fn push(&mut self, event: LinkEvent) {
        self.events.push_back(event);
    }

    /// 溜まっているイベントをすべて取り出す
    pub fn drain(&mut self) -> Vec<LinkEvent> {
        self.events.drain(..).collect()
    }

    /// 未取得のイベントがあるか
    pub fn has_pending(&self) -> bool {
        !self.events.is_empty()
    }

    /// 送信したデータのバイト数を記録する
    pub fn record_sent(&mut self, len: usize) {
        self.total_sent_bytes += len as u64;
    }

    /// 受信したデータの累計バイト数
    pub fn total_received_bytes(&self) -> u64 {
        self.total_received_bytes
    }

    /// 送信したデータの累計バイト数
    pub fn total_sent_bytes(&self) -> u64 {
        self.total_sent_bytes
    }
}

impl Handler for Mailbox {
    fn on_connection_requested(&mut self) {
        self.push(LinkEvent::ConnectionRequested);
    }

    fn on_connected(&mut self) {
        self.push(LinkEvent::Connected);
    }

    fn on_disconnected(&mut self) {
        self.push(LinkEvent::Disconnected);
    }

    fn on_data_received(&mut self, payload: &[u8]) {
        self.total_received_bytes += payload.len() as u64;
        self.push(LinkEvent::Data(payload.to_vec()));
    }
}
