//! UDP リンク
//!
//! ノンブロッキングの `UdpSocket` を `Link` として使う。相手のアドレスは
//! `set_peer` で固定するか、最初に受信したデータグラムの送信元で決まる。

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use log::{debug, warn};
use relink_core::Link;

/// UDP 上の非信頼リンク
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    peer: Option<SocketAddr>,
}

impl UdpLink {
    /// ローカルアドレスにバインドする（ノンブロッキング）
    pub fn bind(local: impl ToSocketAddrs) -> io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.set_nonblocking(true)?;
        Ok(UdpLink { socket, peer: None })
    }

    /// 送信先を固定する
    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    /// 送信先を解除する（次に受信した相手を受け入れる）
    pub fn clear_peer(&mut self) {
        self.peer = None;
    }

    /// 現在の送信先
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// バインドしたローカルアドレス
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// データグラムを 1 つ受信する
    ///
    /// # 戻り値
    /// 受信できなければ `Ok(None)`
    pub fn recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok(received) => Ok(Some(received)),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// この送信元のデータグラムを受け入れるか判定する
    ///
    /// 送信先が未定なら送信元を新しい送信先にする。
    pub fn accept_from(&mut self, from: SocketAddr) -> bool {
        match self.peer {
            Some(peer) => peer == from,
            None => {
                debug!("adopting {} as peer", from);
                self.peer = Some(from);
                true
            }
        }
    }
}

impl Link for UdpLink {
    fn send_packet(&mut self, packet: &[u8]) -> bool {
        let Some(peer) = self.peer else {
            debug!("no peer, dropping {}-byte packet", packet.len());
            return false;
        };

        match self.socket.send_to(packet, peer) {
            Ok(sent) => sent == packet.len(),
            Err(err) => {
                warn!("send to {} failed: {}", peer, err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_peer_is_rejected() {
        let mut link = UdpLink::bind("127.0.0.1:0").unwrap();
        assert!(!link.send_packet(b"x"));
    }

    #[test]
    fn test_accept_from_adopts_first_sender() {
        let mut link = UdpLink::bind("127.0.0.1:0").unwrap();
        let first: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let other: SocketAddr = "127.0.0.1:4001".parse().unwrap();

        assert!(link.accept_from(first));
        assert!(link.accept_from(first));
        assert!(!link.accept_from(other), "別の送信元は拒否");

        link.clear_peer();
        assert!(link.accept_from(other));
        assert_eq!(link.peer(), Some(other));
    }

    #[test]
    fn test_loopback_datagram() {
        let mut a = UdpLink::bind("127.0.0.1:0").unwrap();
        let b = UdpLink::bind("127.0.0.1:0").unwrap();
        a.set_peer(b.local_addr().unwrap());
        assert!(a.send_packet(b"hello"));

        let mut buf = [0u8; 64];
        let mut received = None;
        for _ in 0..200 {
            if let Some(got) = b.recv_from(&mut buf).unwrap() {
                received = Some(got);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let (len, from) = received.expect("ループバックで届くはず");
        assert_eq!(&buf[..len], b"hello");
        assert_eq!(from, a.local_addr().unwrap());
    }
}
