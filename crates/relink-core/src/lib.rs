//! # relink-core
//!
//! 非信頼データグラムリンク上の ARQ（自動再送要求）トランスポート。
//!
//! ## 概要
//!
//! - **信頼メッセージ**: シーケンス ID を割り当てて未 ACK キューに保持し、ACK されるまで再送する
//! - **非信頼メッセージ**: 次のパケットに 1 回だけ載せる（Ping、SingleUnreliable など）
//! - **累積 ACK**: 送信パケットのヘッダーに「最後に受け付けた ID」を常に載せる
//! - **重複排除**: 期待する ID と一致しない信頼メッセージは黙って捨てる（NACK なし）
//! - **タイムアウト**: 一定時間受信がなければ `tick` が `TimedOut` を返す
//!
//! ## 接続の状態遷移
//!
//! ```text
//! Idle ──connect──────────→ ConnectRequested ──ConnectionResponse 受信──→ Connected
//! Idle ──ConnectionRequest 受信→ ConnectReceived ──finish_connection──→ Connected
//! Connected ──disconnect / DisconnectRequest 受信──→ Disconnected
//! 任意 ──reset──→ Idle
//! ```
//!
//! `Idle` / `Disconnected` の間は、最初の信頼サブメッセージが接続要求のパケット以外を捨てる。
//!
//! すべての処理は呼び出し側のスレッドで同期的に行い、ヒープ確保はしない。
//! バッファ容量は const generics（MTU、キュー深さ、バイト領域）で決める。

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod connection;
pub mod error;
pub mod link;
pub mod queue;
mod receive;
pub mod staging;
pub mod stats;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use config::TransportConfig;
pub use connection::{ConnectionRecord, ConnectionState};
pub use error::{ConfigError, QueueError, ReceiveError, SendError, TimedOut};
pub use link::{Handler, Link};
pub use queue::{OutboundQueue, PendingMessage, PendingRun};
pub use staging::TxStaging;
pub use stats::TransportStats;
pub use transport::Transport;

pub use relink_proto::{MessageKind, SequenceId, NO_TAG};

/// 既定の MTU（バイト）
pub const DEFAULT_MTU: usize = 1420;

/// 既定の未 ACK キュー深さ
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

/// 既定の未 ACK バイト領域（バイト）
pub const DEFAULT_REGION_CAPACITY: usize = 4096;

/// 接続タイムアウト（ミリ秒）
pub const CONNECTION_TIMEOUT_MS: u64 = 5000;

/// プレタイムアウト（ミリ秒）
pub const PRETIMEOUT_MS: u64 = 2500;

/// 再送間隔（ミリ秒）
pub const RETRANSMIT_INTERVAL_MS: u64 = 50;

/// 再送タイマー 1 回あたりの最大パケット数
pub const RESEND_PACKETS_PER_TICK: u32 = 3;

/// ACK 受信時に未送信メッセージを送る最大パケット数
pub const RESEND_PACKETS_ON_ACK: u32 = 1;

/// 既定容量のトランスポート
pub type DefaultTransport<L, H> = Transport<L, H, DEFAULT_MTU, DEFAULT_QUEUE_DEPTH, DEFAULT_REGION_CAPACITY>;
