//! 外部コラボレータとの境界
//!
//! - [`Link`]: 下位の非信頼データグラムリンク（UDP、無線モジュールなど）
//! - [`Handler`]: 上位のアプリケーション層へのコールバック
//!
//! どちらも `receive` / `tick` / `send` の中から同期的に呼ばれる。

/// 非信頼データグラムリンク
pub trait Link {
    /// フレーム化済みのパケットを 1 つ送信する
    ///
    /// # 戻り値
    /// リンクが受け付けたら `true`。`false` の場合パケットはステージングに残る。
    fn send_packet(&mut self, packet: &[u8]) -> bool;
}

/// アプリケーション層へのイベント通知
pub trait Handler {
    /// 相手から接続要求を受信した（`finish_connection` で応答する）
    fn on_connection_requested(&mut self);

    /// 相手が接続応答を返した
    fn on_connected(&mut self);

    /// 相手から切断要求を受信した（接続状態はリセット済み）
    fn on_disconnected(&mut self);

    /// データメッセージを受信した（タグがあれば先頭バイト）
    fn on_data_received(&mut self, payload: &[u8]);
}

impl<T: Link + ?Sized> Link for &mut T {
    fn send_packet(&mut self, packet: &[u8]) -> bool {
        (**self).send_packet(packet)
    }
}

impl<T: Handler + ?Sized> Handler for &mut T {
    fn on_connection_requested(&mut self) {
        (**self).on_connection_requested()
    }

    fn on_connected(&mut self) {
        (**self).on_connected()
    }

    fn on_disconnected(&mut self) {
        (**self).on_disconnected()
    }

    fn on_data_received(&mut self, payload: &[u8]) {
        (**self).on_data_received(payload)
    }
}
