//! # relink-host
//!
//! std 環境向けの relink 統合。
//!
//! - [`UdpLink`]: ノンブロッキング UDP ソケットによる `Link` 実装
//! - [`Mailbox`]: 受信イベントをバッファする `Handler` 実装
//! - [`Endpoint`]: 単調時計とポーリングループを持つエンドポイント
//!
//! ```no_run
//! use relink_host::{Endpoint, LinkEvent};
//! use relink_core::TransportConfig;
//!
//! # fn main() -> Result<(), relink_host::HostError> {
//! let mut endpoint = Endpoint::bind("127.0.0.1:0", TransportConfig::default())?;
//! endpoint.connect("127.0.0.1:7400".parse().unwrap())?;
//! loop {
//!     for event in endpoint.poll()? {
//!         if event == LinkEvent::Connected {
//!             endpoint.send(b"hello", true)?;
//!         }
//!     }
//! #   break;
//! }
//! # Ok(())
//! # }
//! ```

pub mod endpoint;
pub mod error;
pub mod mailbox;
pub mod udp;

pub use endpoint::Endpoint;
pub use error::HostError;
pub use mailbox::{LinkEvent, Mailbox};
pub use udp::UdpLink;
