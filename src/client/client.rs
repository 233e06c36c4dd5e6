use std::sync::Arc;

use tokio::net::UdpSocket;

use super::config::ClientConfig;
use crate::core::{Packet, Session, Socket, TidAllocator, TidLease, TransferError, TransferStats};
use crate::logging::Logger;
use crate::store::{self, FileStore};

/// TFTP client
///
/// Supports file download (RRQ) and upload (WRQ)
///
/// # Example
///
/// ```rust,no_run
/// use rtftp::client::{Client, ClientConfig};
/// use rtftp::logging::LogFacade;
/// use rtftp::store::LocalStore;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// # async fn transfer() -> Result<(), rtftp::core::TransferError> {
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// let store = Arc::new(LocalStore::new(PathBuf::from(".")));
/// let client = Client::new(config, store, Arc::new(LogFacade));
///
/// // Download file
/// client.request_file("remote.txt").await?;
///
/// // Upload file
/// client.write_file("local.txt").await?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    store: Arc<dyn FileStore>,
    logger: Arc<dyn Logger>,
    tids: TidAllocator,
}

impl Client {
    /// Create a new TFTP client
    pub fn new(config: ClientConfig, store: Arc<dyn FileStore>, logger: Arc<dyn Logger>) -> Self {
        Self {
            tids: TidAllocator::new(config.tid_range.clone()),
            config,
            store,
            logger,
        }
    }

    /// Download `path` from the server (RRQ)
    ///
    /// The file is stored under the last segment of `path`, and only once
    /// the whole transfer succeeded.
    pub async fn request_file(&self, path: &str) -> Result<TransferStats, TransferError> {
        self.logger.info(format_args!(
            "Downloading {} from {}",
            path,
            self.config.server_addr()
        ));

        let request = Packet::Rrq {
            filename: path.to_string(),
            mode: self.config.mode,
        };
        let (mut session, _lease) = self.open(request).await?;
        let result = self.download(&mut session, path).await;
        self.finish(&session, "Download", path, result).await
    }

    /// Upload the local file `path` to the server (WRQ)
    pub async fn write_file(&self, path: &str) -> Result<TransferStats, TransferError> {
        self.logger.info(format_args!(
            "Uploading {} to {}",
            path,
            self.config.server_addr()
        ));

        // A missing local file never reaches the wire.
        let source = path.to_string();
        let content = store::blocking(&self.store, path, move |s| s.read_file(&source)).await?;

        let request = Packet::Wrq {
            filename: path.to_string(),
            mode: self.config.mode,
        };
        let (mut session, _lease) = self.open(request).await?;
        let result = self.upload(&mut session, &content).await;
        self.finish(&session, "Upload", path, result).await
    }

    /// Deliver `request` from a throwaway socket, then listen on the same
    /// local endpoint for the server's reply from its new TID.
    async fn open(&self, request: Packet) -> Result<(Session, TidLease), TransferError> {
        let server_addr = self.config.server_addr();
        let (initial, lease) = self.tids.bind(self.config.bind_ip).await?;
        let local_addr = initial.local_addr()?;

        initial.send_to(&request.serialize()?, server_addr).await?;
        self.logger.debug(format_args!(
            "Sent {} to {} from {}",
            request.kind(),
            server_addr,
            local_addr
        ));
        drop(initial);

        let udp = UdpSocket::bind(local_addr).await?;
        let socket = Socket::new(
            udp,
            None,
            self.config.transfer.timeout,
            Arc::clone(&self.logger),
        );
        let mut session = Session::new(socket, self.config.transfer, Arc::clone(&self.logger));
        session.retransmit_on_timeout(request, server_addr);
        Ok((session, lease))
    }

    /// Sink role: the first reply is DATA 1 (or an ERROR)
    async fn download(&self, session: &mut Session, path: &str) -> Result<TransferStats, TransferError> {
        let first = session.recv().await?;
        let (content, stats) = session.receive_blocks(Some(first)).await?;

        let name = store::destination_name(path).to_string();
        let target = name.clone();
        store::blocking(&self.store, &name, move |s| s.create_file(&target, &content)).await?;
        session.linger().await;
        Ok(stats)
    }

    /// Source role: wait for ACK 0, then send every block
    async fn upload(&self, session: &mut Session, content: &[u8]) -> Result<TransferStats, TransferError> {
        match session.recv().await? {
            Packet::Ack(0) => {}
            Packet::Error { code, msg } => return Err(TransferError::Peer { code, msg }),
            other => {
                return Err(TransferError::protocol(format!(
                    "expected ACK 0, got {}",
                    other.kind()
                )));
            }
        }
        session.send_blocks(content).await
    }

    async fn finish(
        &self,
        session: &Session,
        what: &str,
        path: &str,
        result: Result<TransferStats, TransferError>,
    ) -> Result<TransferStats, TransferError> {
        match &result {
            Ok(stats) => self.logger.info(format_args!(
                "{} complete: {} ({} bytes, {} blocks)",
                what, path, stats.bytes, stats.blocks
            )),
            Err(err) => {
                session.abort(err).await;
                self.logger
                    .error(format_args!("{} of {} failed: {}", what, path, err));
            }
        }
        result
    }
}
