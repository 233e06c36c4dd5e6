use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::task::JoinSet;

use super::config::Config;
use super::worker::{Request, Worker};
use crate::core::{
    ErrorCode, Packet, RECV_BUFFER_SIZE, Session, Socket, TidAllocator, TransferError,
    TransferStats,
};
use crate::logging::Logger;
use crate::store::FileStore;

type SessionResult = Result<TransferStats, TransferError>;

/// TFTP server
///
/// Owns the rendezvous socket. Every read or write request gets its own
/// worker task on a fresh TID; the accept loop never waits on a transfer.
///
/// # Example
///
/// ```rust,no_run
/// use rtftp::logging::LogFacade;
/// use rtftp::server::{Config, Server};
/// use rtftp::store::RootedStore;
/// use std::path::PathBuf;
/// use std::sync::Arc;
///
/// # async fn serve() -> anyhow::Result<()> {
/// let config = Config::new("0.0.0.0".parse()?, 69, PathBuf::from("/srv/tftp"), false);
/// let store = Arc::new(RootedStore::new(
///     config.send_directory.clone(),
///     config.receive_directory.clone(),
///     config.overwrite,
/// ));
/// let server = Server::new(&config, store, Arc::new(LogFacade)).await?;
/// server.listen(async { let _ = tokio::signal::ctrl_c().await; }).await?;
/// # Ok(())
/// # }
/// ```
pub struct Server {
    socket: UdpSocket,
    config: Config,
    store: Arc<dyn FileStore>,
    logger: Arc<dyn Logger>,
    tids: TidAllocator,
}

impl Server {
    /// Bind the rendezvous socket
    pub async fn new(
        config: &Config,
        store: Arc<dyn FileStore>,
        logger: Arc<dyn Logger>,
    ) -> Result<Self> {
        let addr = config.bind_addr();
        let socket = UdpSocket::bind(addr)
            .await
            .with_context(|| format!("Failed to bind TFTP server to {}", addr))?;

        Ok(Self {
            socket,
            tids: TidAllocator::new(config.tid_range.clone()),
            config: config.clone(),
            store,
            logger,
        })
    }

    /// Address of the rendezvous socket
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Serve requests until `shutdown` completes, then wait for every
    /// transfer still in flight.
    ///
    /// Returns an error only if the rendezvous socket fails.
    pub async fn listen<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = self.local_addr() {
            self.logger
                .info(format_args!("TFTP server listening on {}", addr));
        }

        let mut sessions = JoinSet::new();
        let result = self.accept(&mut sessions, shutdown).await;

        let Server { socket, logger, .. } = self;
        // Closing the rendezvous socket refuses new requests while we drain.
        drop(socket);

        if !sessions.is_empty() {
            logger.info(format_args!(
                "Waiting for {} active transfer(s) to finish",
                sessions.len()
            ));
        }
        while let Some(joined) = sessions.join_next().await {
            reap(logger.as_ref(), joined);
        }

        logger.info(format_args!("TFTP server stopped"));
        result
    }

    async fn accept<F>(&self, sessions: &mut JoinSet<SessionResult>, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    self.logger.info(format_args!("Shutdown requested, no longer accepting requests"));
                    return Ok(());
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    reap(self.logger.as_ref(), joined);
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (len, from) = received.context("Receive on the rendezvous socket failed")?;
                    self.dispatch(&buf[..len], from, sessions).await;
                }
            }
        }
    }

    /// Turn the first datagram of an exchange into a worker
    async fn dispatch(
        &self,
        datagram: &[u8],
        from: SocketAddr,
        sessions: &mut JoinSet<SessionResult>,
    ) {
        let request = match Packet::deserialize(datagram) {
            Ok(Packet::Rrq { filename, mode }) => Request::Read { filename, mode },
            Ok(Packet::Wrq { filename, mode }) => Request::Write { filename, mode },
            Ok(other @ (Packet::Data { .. } | Packet::Ack(_) | Packet::Error { .. })) => {
                self.logger.warn(format_args!(
                    "Ignoring {} from {}: not a read or write request",
                    other.kind(),
                    from
                ));
                return;
            }
            Err(e) => {
                self.logger
                    .warn(format_args!("Ignoring malformed datagram from {}: {}", from, e));
                return;
            }
        };

        let (udp, lease) = match self.tids.bind(self.config.ip_address).await {
            Ok(bound) => bound,
            Err(e) => {
                self.logger
                    .error(format_args!("No transfer id available for {}: {}", from, e));
                self.refuse(from, ErrorCode::NotDefined, "server busy").await;
                return;
            }
        };

        self.logger.info(format_args!(
            "{} {} from {} on port {}",
            match request {
                Request::Read { .. } => "RRQ",
                Request::Write { .. } => "WRQ",
            },
            request.filename(),
            from,
            lease.port()
        ));

        let socket = Socket::new(
            udp,
            Some(from),
            self.config.transfer.timeout,
            Arc::clone(&self.logger),
        );
        let session = Session::new(socket, self.config.transfer, Arc::clone(&self.logger));
        let worker = Worker::new(
            session,
            request,
            from,
            Arc::clone(&self.store),
            Arc::clone(&self.logger),
            self.config.read_only,
            lease,
        );

        sessions.spawn(worker.run());
        self.logger
            .debug(format_args!("{} active transfer(s)", sessions.len()));
    }

    async fn refuse(&self, to: SocketAddr, code: ErrorCode, msg: &str) {
        let reply = Packet::error(code, msg);
        let sent = match reply.serialize() {
            Ok(bytes) => self.socket.send_to(&bytes, to).await.map(|_| ()),
            Err(e) => Err(io::Error::other(e)),
        };
        if let Err(e) = sent {
            self.logger
                .warn(format_args!("Failed to send error packet to {}: {}", to, e));
        }
    }
}

fn reap(logger: &dyn Logger, joined: std::result::Result<SessionResult, tokio::task::JoinError>) {
    // Outcomes are logged by the worker itself; only a panic is news here.
    if let Err(e) = joined {
        logger.error(format_args!("Transfer task ended abnormally: {}", e));
    }
}
