//! The per-transfer state machine.
//!
//! The same two loops serve both ends: the source of a transfer (server on
//! a read, client on a write) runs [`Session::send_blocks`], the sink runs
//! [`Session::receive_blocks`]. Exactly one block is in flight at a time.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::blocks::{self, BLOCK_SIZE};
use super::error::TransferError;
use super::packet::Packet;
use super::socket::Socket;
use crate::logging::Logger;

/// Timing of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferConfig {
    /// How long to wait for each reply
    pub timeout: Duration,
    /// How often the last packet is re-sent before giving up
    pub max_retries: u32,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_retries: 5,
        }
    }
}

/// What a finished transfer moved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: usize,
    pub blocks: usize,
    pub retransmissions: u32,
}

/// One transfer in progress over its own [`Socket`]
pub struct Session {
    socket: Socket,
    config: TransferConfig,
    logger: Arc<dyn Logger>,
    last_sent: Option<(Packet, SocketAddr)>,
    /// When the current wait for a reply to `last_sent` runs out
    deadline: Instant,
    /// Re-sends of `last_sent` so far
    attempts: u32,
    retransmissions: u32,
}

impl Session {
    pub fn new(socket: Socket, config: TransferConfig, logger: Arc<dyn Logger>) -> Self {
        Self {
            socket,
            config,
            logger,
            last_sent: None,
            deadline: Instant::now() + config.timeout,
            attempts: 0,
            retransmissions: 0,
        }
    }

    pub fn socket(&self) -> &Socket {
        &self.socket
    }

    /// Send to the peer, keeping the packet for retransmission
    pub async fn send(&mut self, packet: Packet) -> Result<(), TransferError> {
        let peer = self
            .socket
            .peer()
            .ok_or_else(|| TransferError::protocol("no peer to send to yet"))?;
        self.send_to(packet, peer).await
    }

    /// Send to an explicit address, keeping the packet for retransmission
    pub async fn send_to(&mut self, packet: Packet, addr: SocketAddr) -> Result<(), TransferError> {
        self.socket.send_to(&packet, addr).await?;
        self.retransmit_on_timeout(packet, addr);
        Ok(())
    }

    /// Make `packet`, already sent by other means, the one re-sent on timeout
    pub fn retransmit_on_timeout(&mut self, packet: Packet, addr: SocketAddr) {
        self.last_sent = Some((packet, addr));
        self.deadline = Instant::now() + self.config.timeout;
        self.attempts = 0;
    }

    /// Wait for the next packet, re-sending the last one on every timeout.
    ///
    /// The timeout and retry budget belong to the last packet sent, not to
    /// this call: stale packets that callers discard do not extend them.
    pub async fn recv(&mut self) -> Result<Packet, TransferError> {
        loop {
            if let Some(packet) = self.socket.recv_until(self.deadline).await? {
                return Ok(packet);
            }
            if self.attempts >= self.config.max_retries {
                return Err(TransferError::Timeout {
                    retries: self.attempts,
                });
            }
            self.attempts += 1;
            self.retransmissions += 1;
            self.deadline = Instant::now() + self.config.timeout;

            if let Some((packet, addr)) = &self.last_sent {
                self.logger.debug(format_args!(
                    "Timeout, re-sending {} to {} (attempt {}/{})",
                    packet.kind(),
                    addr,
                    self.attempts,
                    self.config.max_retries
                ));
                self.socket.send_to(packet, *addr).await?;
            }
        }
    }

    /// Source role: send `content` block by block, each acknowledged before the next.
    pub async fn send_blocks(&mut self, content: &[u8]) -> Result<TransferStats, TransferError> {
        let mut stats = TransferStats::default();

        for (index, block) in blocks::split(content).into_iter().enumerate() {
            let block_num = blocks::block_number(index);
            self.send(Packet::Data {
                block_num,
                data: block.to_vec(),
            })
            .await?;
            self.await_ack(block_num).await?;

            stats.blocks += 1;
            stats.bytes += block.len();
        }

        stats.retransmissions = self.retransmissions;
        Ok(stats)
    }

    /// Wait until the peer acknowledges `block_num`.
    ///
    /// A repeated acknowledgement of the previous block is dropped without
    /// re-sending anything.
    pub async fn await_ack(&mut self, block_num: u16) -> Result<(), TransferError> {
        loop {
            match self.recv().await? {
                Packet::Ack(ack) if ack == block_num => return Ok(()),
                Packet::Ack(ack) if ack == block_num.wrapping_sub(1) => {
                    self.logger
                        .debug(format_args!("Duplicate ACK {} ignored", ack));
                }
                Packet::Ack(ack) => {
                    return Err(TransferError::protocol(format!(
                        "expected ACK {}, got ACK {}",
                        block_num, ack
                    )));
                }
                Packet::Error { code, msg } => return Err(TransferError::Peer { code, msg }),
                other => {
                    return Err(TransferError::protocol(format!(
                        "expected ACK {}, got {}",
                        block_num,
                        other.kind()
                    )));
                }
            }
        }
    }

    /// Sink role: acknowledge DATA packets until a short block ends the transfer.
    ///
    /// `first` is a packet already received while establishing the transfer.
    pub async fn receive_blocks(
        &mut self,
        first: Option<Packet>,
    ) -> Result<(Vec<u8>, TransferStats), TransferError> {
        let mut content = Vec::new();
        let mut stats = TransferStats::default();
        let mut expected: u16 = 1;
        let mut pending = first;

        loop {
            let packet = match pending.take() {
                Some(packet) => packet,
                None => self.recv().await?,
            };

            match packet {
                Packet::Data { block_num, data } if block_num == expected => {
                    content.extend_from_slice(&data);
                    stats.blocks += 1;
                    stats.bytes += data.len();
                    self.send(Packet::Ack(block_num)).await?;

                    if data.len() < BLOCK_SIZE {
                        stats.retransmissions = self.retransmissions;
                        return Ok((content, stats));
                    }
                    expected = expected.wrapping_add(1);
                }
                Packet::Data { block_num, .. }
                    if stats.blocks > 0 && block_num == expected.wrapping_sub(1) =>
                {
                    // Our ACK got lost; the peer is repeating itself.
                    self.socket.send(&Packet::Ack(block_num)).await?;
                }
                Packet::Data { block_num, .. } => {
                    return Err(TransferError::protocol(format!(
                        "expected DATA {}, got DATA {}",
                        expected, block_num
                    )));
                }
                Packet::Error { code, msg } => return Err(TransferError::Peer { code, msg }),
                other => {
                    return Err(TransferError::protocol(format!(
                        "expected DATA {}, got {}",
                        expected,
                        other.kind()
                    )));
                }
            }
        }
    }

    /// Stay reachable for one timeout after the final ACK.
    ///
    /// If that ACK was lost the peer re-sends its last DATA; answering it
    /// lets the peer finish instead of timing out on a completed transfer.
    pub async fn linger(&mut self) {
        let Some((Packet::Ack(last), _)) = self.last_sent.clone() else {
            return;
        };
        let deadline = Instant::now() + self.config.timeout;
        loop {
            match self.socket.recv_until(deadline).await {
                Ok(Some(Packet::Data { block_num, .. })) if block_num == last => {
                    self.logger
                        .debug(format_args!("Final DATA {} repeated, acknowledging again", last));
                    if let Err(e) = self.socket.send(&Packet::Ack(last)).await {
                        self.logger
                            .warn(format_args!("Failed to re-send final ACK {}: {}", last, e));
                        return;
                    }
                }
                Ok(None) => return,
                Ok(Some(other)) => {
                    self.logger
                        .debug(format_args!("Ignoring {} after the final ACK", other.kind()));
                    return;
                }
                Err(e) => {
                    self.logger
                        .debug(format_args!("Stopped waiting after the final ACK: {}", e));
                    return;
                }
            }
        }
    }

    /// Tell the peer why the transfer stopped, if it is owed an explanation.
    ///
    /// Best effort: a failed send is logged and otherwise ignored.
    pub async fn abort(&self, err: &TransferError) {
        let (Some(code), Some(peer)) = (err.error_code(), self.socket.peer()) else {
            return;
        };
        if let Err(e) = self.socket.send_to(&Packet::error(code, err), peer).await {
            self.logger
                .warn(format_args!("Failed to send error packet to {}: {}", peer, e));
        }
    }
}
