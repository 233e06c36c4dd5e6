#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use rtftp::core::{Packet, TransferConfig};
use rtftp::logging::MemoryLogger;
use rtftp::server::{Config, Server};
use rtftp::store::RootedStore;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub addr: SocketAddr,
    pub logger: Arc<MemoryLogger>,
    pub handle: JoinHandle<anyhow::Result<()>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub async fn start(dir: &Path, transfer: TransferConfig) -> Self {
        Self::start_with(Config::new("127.0.0.1".parse().unwrap(), 0, dir.to_path_buf(), false)
            .with_transfer(transfer))
        .await
    }

    pub async fn start_with(config: Config) -> Self {
        let logger = MemoryLogger::new();
        let store = Arc::new(RootedStore::new(
            config.send_directory.clone(),
            config.receive_directory.clone(),
            config.overwrite,
        ));
        let server = Server::new(&config, store, logger.clone()).await.unwrap();
        let addr = server.local_addr().unwrap();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.listen(async move {
            let _ = rx.await;
        }));

        Self {
            addr,
            logger,
            handle,
            shutdown: Some(tx),
        }
    }

    pub fn request_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    pub async fn stop(mut self) {
        self.request_shutdown();
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Fast timeouts so failure paths finish quickly
pub fn quick(max_retries: u32) -> TransferConfig {
    TransferConfig {
        timeout: Duration::from_millis(300),
        max_retries,
    }
}

/// A hand-driven UDP peer for observing exact packet exchanges
pub struct RawPeer {
    pub socket: UdpSocket,
}

impl RawPeer {
    pub async fn bind() -> Self {
        Self {
            socket: UdpSocket::bind("127.0.0.1:0").await.unwrap(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().unwrap()
    }

    pub async fn send(&self, packet: &Packet, to: SocketAddr) {
        self.socket
            .send_to(&packet.serialize().unwrap(), to)
            .await
            .unwrap();
    }

    pub async fn send_raw(&self, bytes: &[u8], to: SocketAddr) {
        self.socket.send_to(bytes, to).await.unwrap();
    }

    pub async fn recv(&self) -> (Packet, SocketAddr) {
        self.try_recv(WAIT).await.expect("no packet arrived")
    }

    pub async fn try_recv(&self, wait: Duration) -> Option<(Packet, SocketAddr)> {
        let mut buf = vec![0u8; 1024];
        match tokio::time::timeout(wait, self.socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => Some((Packet::deserialize(&buf[..len]).unwrap(), from)),
            _ => None,
        }
    }

    /// Next DATA packet for `block_num`, skipping retransmitted earlier blocks
    pub async fn recv_data(&self, block_num: u16) -> (Vec<u8>, SocketAddr) {
        loop {
            match self.recv().await {
                (Packet::Data { block_num: got, data }, from) if got == block_num => {
                    return (data, from);
                }
                (Packet::Data { block_num: got, .. }, _) if got < block_num => continue,
                (other, _) => panic!("expected DATA {}, got {:?}", block_num, other),
            }
        }
    }

    pub async fn expect_silence(&self, wait: Duration) {
        if let Some((packet, from)) = self.try_recv(wait).await {
            panic!("unexpected {:?} from {}", packet, from);
        }
    }
}

pub fn rrq(filename: &str) -> Packet {
    Packet::Rrq {
        filename: filename.to_string(),
        mode: rtftp::core::TransferMode::Octet,
    }
}

pub fn wrq(filename: &str) -> Packet {
    Packet::Wrq {
        filename: filename.to_string(),
        mode: rtftp::core::TransferMode::Octet,
    }
}

/// Deterministic non-text content with plenty of zero bytes
pub fn content(len: usize) -> Vec<u8> {
    (0..len).map(|i| if i % 3 == 0 { 0 } else { (i % 251) as u8 }).collect()
}

/// Poll until `path` holds `len` bytes
pub async fn wait_for_file(path: &Path, len: usize) -> Vec<u8> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if let Ok(bytes) = std::fs::read(path) {
            if bytes.len() == len {
                return bytes;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{} never appeared",
            path.display()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
