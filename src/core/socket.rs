use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::{Instant, timeout_at};

use super::error::TransferError;
use super::packet::{ErrorCode, Packet};
use crate::logging::Logger;

/// Receive buffer size; anything larger than a DATA packet is rejected by the codec.
pub const RECV_BUFFER_SIZE: usize = 65536;

/// The dedicated endpoint of one transfer.
///
/// The socket is never `connect`ed: the client learns the server's TID
/// from the first reply, and datagrams from any other address are answered
/// with an "unknown transfer ID" error and otherwise ignored.
pub struct Socket {
    inner: UdpSocket,
    peer: Option<SocketAddr>,
    timeout: Duration,
    logger: Arc<dyn Logger>,
    buf: Vec<u8>,
}

impl Socket {
    pub fn new(
        inner: UdpSocket,
        peer: Option<SocketAddr>,
        timeout: Duration,
        logger: Arc<dyn Logger>,
    ) -> Self {
        Self {
            inner,
            peer,
            timeout,
            logger,
            buf: vec![0u8; RECV_BUFFER_SIZE],
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Remote TID, once known
    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub async fn send_to(&self, packet: &Packet, addr: SocketAddr) -> Result<(), TransferError> {
        let bytes = packet.serialize()?;
        self.inner.send_to(&bytes, addr).await?;
        self.logger
            .debug(format_args!("-> {} {}", addr, describe(packet)));
        Ok(())
    }

    /// Send to the peer
    pub async fn send(&self, packet: &Packet) -> Result<(), TransferError> {
        let peer = self
            .peer
            .ok_or_else(|| TransferError::protocol("no peer to send to yet"))?;
        self.send_to(packet, peer).await
    }

    /// Wait for the next packet from the peer.
    ///
    /// Returns `Ok(None)` when nothing arrived within the timeout. The first
    /// well-formed packet fixes the peer address if it was not known yet.
    pub async fn recv(&mut self) -> Result<Option<Packet>, TransferError> {
        self.recv_until(Instant::now() + self.timeout).await
    }

    /// Like [`Socket::recv`], but gives up at `deadline`
    pub async fn recv_until(&mut self, deadline: Instant) -> Result<Option<Packet>, TransferError> {
        loop {
            let (len, from) = match timeout_at(deadline, self.inner.recv_from(&mut self.buf)).await {
                Ok(received) => received?,
                Err(_) => return Ok(None),
            };

            if let Some(peer) = self.peer {
                if peer != from {
                    self.reject_stranger(from).await;
                    continue;
                }
            }

            let packet = match Packet::deserialize(&self.buf[..len]) {
                Ok(packet) => packet,
                // Until the peer is known, garbage from anyone must not end the transfer.
                Err(e) if self.peer.is_none() => {
                    self.logger
                        .warn(format_args!("Ignoring malformed datagram from {}: {}", from, e));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            self.logger
                .debug(format_args!("<- {} {}", from, describe(&packet)));
            if self.peer.is_none() {
                self.logger
                    .debug(format_args!("transfer peer is {}", from));
                self.peer = Some(from);
            }
            return Ok(Some(packet));
        }
    }

    async fn reject_stranger(&self, from: SocketAddr) {
        self.logger.warn(format_args!(
            "Ignoring datagram from unknown transfer id {}",
            from
        ));
        let reply = Packet::error(ErrorCode::UnknownTid, "unknown transfer ID");
        if let Err(e) = self.send_to(&reply, from).await {
            self.logger
                .warn(format_args!("Failed to answer stray datagram from {}: {}", from, e));
        }
    }
}

fn describe(packet: &Packet) -> String {
    match packet {
        Packet::Rrq { filename, mode } | Packet::Wrq { filename, mode } => {
            format!("{} {} ({})", packet.kind(), filename, mode)
        }
        Packet::Data { block_num, data } => format!("DATA {} ({} bytes)", block_num, data.len()),
        Packet::Ack(block_num) => format!("ACK {}", block_num),
        Packet::Error { code, msg } => format!("ERROR {}: {}", code, msg),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemoryLogger;
    use log::Level;

    async fn pair() -> (UdpSocket, UdpSocket) {
        let a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn first_packet_fixes_the_peer() {
        let (local, remote) = pair().await;
        let mut socket = Socket::new(local, None, Duration::from_secs(2), MemoryLogger::new());
        let local_addr = socket.local_addr().unwrap();

        remote
            .send_to(&Packet::Ack(0).serialize().unwrap(), local_addr)
            .await
            .unwrap();
        assert_eq!(socket.recv().await.unwrap(), Some(Packet::Ack(0)));
        assert_eq!(socket.peer(), Some(remote.local_addr().unwrap()));
    }

    #[tokio::test]
    async fn strangers_get_unknown_tid() {
        let (local, peer) = pair().await;
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let logger = MemoryLogger::new();
        let mut socket = Socket::new(
            local,
            Some(peer.local_addr().unwrap()),
            Duration::from_secs(2),
            logger.clone(),
        );
        let local_addr = socket.local_addr().unwrap();

        stranger
            .send_to(&Packet::Ack(1).serialize().unwrap(), local_addr)
            .await
            .unwrap();
        peer.send_to(&Packet::Ack(2).serialize().unwrap(), local_addr)
            .await
            .unwrap();

        assert_eq!(socket.recv().await.unwrap(), Some(Packet::Ack(2)));

        let mut buf = [0u8; 64];
        let (len, _) = stranger.recv_from(&mut buf).await.unwrap();
        match Packet::deserialize(&buf[..len]).unwrap() {
            Packet::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownTid),
            other => panic!("unexpected packet {:?}", other),
        }
        assert!(logger.contains(Level::Warn, "unknown transfer id"));
    }

    #[tokio::test]
    async fn timeout_yields_none() {
        let (local, peer) = pair().await;
        let mut socket = Socket::new(
            local,
            Some(peer.local_addr().unwrap()),
            Duration::from_millis(50),
            MemoryLogger::new(),
        );
        assert_eq!(socket.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn garbage_before_the_peer_is_known_is_skipped() {
        let (local, server) = pair().await;
        let stranger = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let logger = MemoryLogger::new();
        let mut socket = Socket::new(local, None, Duration::from_secs(2), logger.clone());
        let local_addr = socket.local_addr().unwrap();

        stranger.send_to(&[0x00, 0x09], local_addr).await.unwrap();
        server
            .send_to(&Packet::Ack(0).serialize().unwrap(), local_addr)
            .await
            .unwrap();

        assert_eq!(socket.recv().await.unwrap(), Some(Packet::Ack(0)));
        assert_eq!(socket.peer(), Some(server.local_addr().unwrap()));
        assert!(logger.contains(Level::Warn, "Ignoring malformed datagram"));
    }

    #[tokio::test]
    async fn malformed_datagram_from_the_peer_is_an_error() {
        let (local, peer) = pair().await;
        let mut socket = Socket::new(
            local,
            Some(peer.local_addr().unwrap()),
            Duration::from_secs(2),
            MemoryLogger::new(),
        );
        peer.send_to(&[0x00, 0x09], socket.local_addr().unwrap())
            .await
            .unwrap();
        assert!(matches!(
            socket.recv().await,
            Err(TransferError::Packet(_))
        ));
    }
}
