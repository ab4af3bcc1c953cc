//! # relink-proto
//!
//! 信頼トランスポートのワイヤフォーマット。
//!
//! シーケンス空間、メッセージ種別、固定ヘッダー、サブメッセージのフレーミングを担当する。
//! ヒープ確保は一切行わない。
//!
//! ## パケットの全体構造
//!
//! ```text
//! [prefix: 'R' 'E' 0x01][class: u8][seq_id_min: u16 LE][seq_id_max: u16 LE][last_received_id: u16 LE]
//! [kind: u8][length: u16 LE][tag?: u8][payload...]   ← Multiple* クラスではこれが繰り返される
//! ```
//!
//! 単一メッセージクラスの場合、ヘッダー以降がそのままメッセージ本体になる。

#![cfg_attr(not(test), no_std)]

pub mod error;
pub mod frame;
pub mod header;
pub mod kind;
pub mod seq;

pub use error::WireError;
pub use frame::{body_len, framed_len, write_frame, FrameIter, SubMessage, FRAME_OVERHEAD, NO_TAG};
pub use header::{PacketHeader, HEADER_LEN, PACKET_PREFIX};
pub use kind::MessageKind;
pub use seq::SequenceId;
