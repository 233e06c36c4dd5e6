use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::core::tid::DEFAULT_TID_RANGE;
use crate::core::{TransferConfig, TransferMode};

/// TFTP client configuration
///
/// # Example
///
/// ```rust
/// use rtftp::client::ClientConfig;
///
/// let config = ClientConfig::new("192.168.1.100".parse().unwrap(), 69);
/// assert_eq!(config.server_addr().port(), 69);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server IP address
    pub server_ip: IpAddr,
    /// Server rendezvous port
    pub server_port: u16,
    /// Local address the client's TID is bound on
    pub bind_ip: IpAddr,
    /// Timeout and retransmission policy
    pub transfer: TransferConfig,
    /// Mode named in requests; the data is always sent as octets
    pub mode: TransferMode,
    /// Where downloaded files are written
    pub output_directory: PathBuf,
    /// Ports the client draws its TID from
    pub tid_range: RangeInclusive<u16>,
}

impl ClientConfig {
    /// Create new client configuration
    ///
    /// # Arguments
    ///
    /// * `server_ip` - Server IP address
    /// * `server_port` - Server port number (usually 69)
    pub fn new(server_ip: IpAddr, server_port: u16) -> Self {
        Self {
            server_ip,
            server_port,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            transfer: TransferConfig::default(),
            mode: TransferMode::Octet,
            output_directory: PathBuf::from("."),
            tid_range: DEFAULT_TID_RANGE,
        }
    }

    /// Build from a `host:port` socket address
    pub fn for_server(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }

    /// Set timeout duration
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.transfer.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.transfer.max_retries = max_retries;
        self
    }

    pub fn with_bind_ip(mut self, bind_ip: IpAddr) -> Self {
        self.bind_ip = bind_ip;
        self
    }

    pub fn with_mode(mut self, mode: TransferMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_output_directory(mut self, output_directory: PathBuf) -> Self {
        self.output_directory = output_directory;
        self
    }

    pub fn with_tid_range(mut self, tid_range: RangeInclusive<u16>) -> Self {
        self.tid_range = tid_range;
        self
    }

    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server_ip, self.server_port)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 69)
    }
}
