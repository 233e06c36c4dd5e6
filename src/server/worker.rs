use std::net::SocketAddr;
use std::sync::Arc;

use crate::core::{Packet, Session, TidLease, TransferError, TransferMode, TransferStats};
use crate::logging::Logger;
use crate::store::{self, FileStore, StoreError};

/// A transfer request accepted on the rendezvous socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// The client downloads `filename`
    Read { filename: String, mode: TransferMode },
    /// The client uploads `filename`
    Write { filename: String, mode: TransferMode },
}

impl Request {
    pub fn filename(&self) -> &str {
        match self {
            Request::Read { filename, .. } | Request::Write { filename, .. } => filename,
        }
    }

    pub fn mode(&self) -> TransferMode {
        match self {
            Request::Read { mode, .. } | Request::Write { mode, .. } => *mode,
        }
    }
}

/// Runs one transfer on its own TID until it completes or fails
pub struct Worker {
    session: Session,
    request: Request,
    peer: SocketAddr,
    store: Arc<dyn FileStore>,
    logger: Arc<dyn Logger>,
    read_only: bool,
    _lease: TidLease,
}

impl Worker {
    pub fn new(
        session: Session,
        request: Request,
        peer: SocketAddr,
        store: Arc<dyn FileStore>,
        logger: Arc<dyn Logger>,
        read_only: bool,
        lease: TidLease,
    ) -> Self {
        Self {
            session,
            request,
            peer,
            store,
            logger,
            read_only,
            _lease: lease,
        }
    }

    /// Drive the transfer and log its outcome
    pub async fn run(mut self) -> Result<TransferStats, TransferError> {
        if self.request.mode() != TransferMode::Octet {
            self.logger.debug(format_args!(
                "{} requested mode {}, transferring as octet",
                self.peer,
                self.request.mode()
            ));
        }

        let result = match self.request.clone() {
            Request::Read { filename, .. } => self.send_file(&filename).await,
            Request::Write { filename, .. } => self.receive_file(&filename).await,
        };

        let (verb, filename) = match &self.request {
            Request::Read { filename, .. } => ("Sent", filename),
            Request::Write { filename, .. } => ("Received", filename),
        };
        match &result {
            Ok(stats) => self.logger.info(format_args!(
                "{} {} ({} bytes, {} blocks, {} retransmissions) with {}",
                verb, filename, stats.bytes, stats.blocks, stats.retransmissions, self.peer
            )),
            Err(err) => {
                self.session.abort(err).await;
                if err.is_remote() {
                    self.logger
                        .warn(format_args!("Transfer of {} with {} failed: {}", filename, self.peer, err));
                } else {
                    self.logger
                        .error(format_args!("Transfer of {} with {} failed: {}", filename, self.peer, err));
                }
            }
        }
        result
    }

    /// Read transfer: this side is the source
    async fn send_file(&mut self, filename: &str) -> Result<TransferStats, TransferError> {
        let path = filename.to_string();
        let content = store::blocking(&self.store, filename, move |s| s.read_file(&path)).await?;
        self.logger.debug(format_args!(
            "Serving {} ({} bytes) to {}",
            filename,
            content.len(),
            self.peer
        ));
        self.session.send_blocks(&content).await
    }

    /// Write transfer: this side is the sink
    async fn receive_file(&mut self, filename: &str) -> Result<TransferStats, TransferError> {
        if self.read_only {
            return Err(StoreError::AccessViolation("server is read-only".to_string()).into());
        }

        let name = store::destination_name(filename).to_string();
        let check = name.clone();
        store::blocking(&self.store, &name, move |s| s.check_create(&check)).await?;

        self.session.send(Packet::Ack(0)).await?;
        let (content, stats) = self.session.receive_blocks(None).await?;

        let target = name.clone();
        store::blocking(&self.store, &name, move |s| s.create_file(&target, &content)).await?;
        self.session.linger().await;
        Ok(stats)
    }
}
