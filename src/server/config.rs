use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;

use crate::core::TransferConfig;
use crate::core::tid::DEFAULT_TID_RANGE;

/// TFTP server configuration
///
/// # Example
///
/// ```rust
/// use rtftp::server::Config;
/// use std::path::PathBuf;
///
/// let config = Config::new("127.0.0.1".parse().unwrap(), 6969, PathBuf::from("/srv/tftp"), true)
///     .with_receive_directory(PathBuf::from("/srv/incoming"))
///     .with_overwrite(false);
/// assert_eq!(config.bind_addr().port(), 6969);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address to listen on
    pub ip_address: IpAddr,
    /// Rendezvous port
    pub port: u16,
    /// Directory uploaded files are written to
    pub receive_directory: PathBuf,
    /// Directory downloaded files are served from
    pub send_directory: PathBuf,
    /// Reject all write requests
    pub read_only: bool,
    /// Whether an upload may replace an existing file
    pub overwrite: bool,
    /// Per-session timeout and retransmission policy
    pub transfer: TransferConfig,
    /// Ports sessions draw their TID from
    pub tid_range: RangeInclusive<u16>,
}

impl Config {
    /// Serve and receive files in `directory` on `ip_address:port`.
    ///
    /// Uploads may replace existing files until [`Config::with_overwrite`]
    /// says otherwise.
    pub fn new(ip_address: IpAddr, port: u16, directory: PathBuf, read_only: bool) -> Self {
        Self {
            ip_address,
            port,
            receive_directory: directory.clone(),
            send_directory: directory,
            read_only,
            overwrite: true,
            transfer: TransferConfig::default(),
            tid_range: DEFAULT_TID_RANGE,
        }
    }

    pub fn with_receive_directory(mut self, directory: PathBuf) -> Self {
        self.receive_directory = directory;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_transfer(mut self, transfer: TransferConfig) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_tid_range(mut self, tid_range: RangeInclusive<u16>) -> Self {
        self.tid_range = tid_range;
        self
    }

    /// Rendezvous address
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip_address, self.port)
    }
}

/// All interfaces, port 69, serving the working directory
impl Default for Config {
    fn default() -> Self {
        let directory = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(Ipv4Addr::UNSPECIFIED.into(), 69, directory, false)
    }
}
