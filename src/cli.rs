//! Command-line surface of the `rtftp` binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use humantime_serde::re::humantime;
use log::LevelFilter;

use crate::client::{ClientConfig, Direction};
use crate::config::FileConfig;
use crate::core::tid::DEFAULT_TID_RANGE;
use crate::core::{TransferConfig, TransferMode};
use crate::server;

const DEFAULT_REMOTE: &str = "127.0.0.1:69";

#[derive(Debug, Parser)]
#[command(name = "rtftp", version, about = "TFTP (RFC 1350) server and client")]
#[command(group(ArgGroup::new("role").required(true).args(["server", "client"])))]
#[command(group(ArgGroup::new("direction").args(["read", "write"])))]
pub struct Cli {
    /// Run a TFTP server
    #[arg(long)]
    pub server: bool,

    /// Run a TFTP client
    #[arg(long)]
    pub client: bool,

    /// Address of the TFTP server (client)
    #[arg(long, value_name = "ADDR")]
    pub remote: Option<SocketAddr>,

    /// Remote file to download (client)
    #[arg(long, value_name = "PATH")]
    pub read: Option<String>,

    /// Local file to upload (client)
    #[arg(long, value_name = "PATH")]
    pub write: Option<String>,

    /// IP address to listen on (server) or bind to (client)
    #[arg(long)]
    pub ip: Option<IpAddr>,

    /// Rendezvous port (server)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory to serve files from (server)
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Directory uploads are stored in, defaults to --dir (server)
    #[arg(long)]
    pub receive_dir: Option<PathBuf>,

    /// Reject write requests (server)
    #[arg(long)]
    pub read_only: bool,

    /// Refuse uploads that would replace an existing file (server)
    #[arg(long)]
    pub no_overwrite: bool,

    /// Wait per reply before re-sending, e.g. "5s" or "500ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Retransmissions before a transfer is abandoned
    #[arg(long)]
    pub retries: Option<u32>,

    /// Directory downloads are written to (client)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Transfer mode named in requests (client)
    #[arg(long)]
    pub mode: Option<TransferMode>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    pub log_level: Option<LevelFilter>,
}

/// The validated role the process runs as
#[derive(Debug)]
pub enum Role {
    Server(server::Config),
    Client(ClientConfig, Direction),
}

impl Cli {
    /// Effective log level: flag, then file, then info
    pub fn log_level(&self, file: &FileConfig) -> LevelFilter {
        self.log_level
            .or_else(|| file.log.level.as_deref().and_then(|l| l.parse().ok()))
            .unwrap_or(LevelFilter::Info)
    }

    /// Check flag combinations and merge them over the file configuration
    pub fn role(&self, file: &FileConfig) -> Result<Role> {
        if self.server == self.client {
            bail!("exactly one of --server or --client must be given");
        }

        if self.server {
            if self.read.is_some() || self.write.is_some() {
                bail!("--read and --write only apply to --client");
            }
            return Ok(Role::Server(self.server_config(file)?));
        }

        let direction = match (&self.read, &self.write) {
            (Some(path), None) => Direction::Read(path.clone()),
            (None, Some(path)) => Direction::Write(path.clone()),
            _ => bail!("a client needs exactly one of --read or --write"),
        };
        Ok(Role::Client(self.client_config(file)?, direction))
    }

    fn server_config(&self, file: &FileConfig) -> Result<server::Config> {
        let section = &file.server;
        let ip = self
            .ip
            .or(section.ip)
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let port = self.port.or(section.port).unwrap_or(69);
        let directory = match self.dir.clone().or_else(|| section.directory.clone()) {
            Some(dir) => dir,
            None => std::env::current_dir().context("Failed to determine current directory")?,
        };
        let receive_directory = self
            .receive_dir
            .clone()
            .or_else(|| section.receive_directory.clone())
            .unwrap_or_else(|| directory.clone());

        let defaults = TransferConfig::default();
        let transfer = TransferConfig {
            timeout: self.timeout.or(section.timeout).unwrap_or(defaults.timeout),
            max_retries: self
                .retries
                .or(section.max_retries)
                .unwrap_or(defaults.max_retries),
        };

        let mut config = server::Config::new(
            ip,
            port,
            directory,
            self.read_only || section.read_only.unwrap_or(false),
        )
        .with_receive_directory(receive_directory)
        .with_overwrite(!self.no_overwrite && section.overwrite.unwrap_or(true))
        .with_transfer(transfer);

        if let Some(range) = tid_range(section.tid_min, section.tid_max)? {
            config = config.with_tid_range(range);
        }
        Ok(config)
    }

    fn client_config(&self, file: &FileConfig) -> Result<ClientConfig> {
        let section = &file.client;
        let remote = match self.remote.or(section.remote) {
            Some(addr) => addr,
            None => DEFAULT_REMOTE.parse()?,
        };
        let mode = match (self.mode, section.mode.as_deref()) {
            (Some(mode), _) => mode,
            (None, Some(text)) => text.parse()?,
            (None, None) => TransferMode::Octet,
        };

        let mut config = ClientConfig::for_server(remote).with_mode(mode);
        if let Some(ip) = self.ip.or(section.bind_ip) {
            config = config.with_bind_ip(ip);
        }
        if let Some(timeout) = self.timeout.or(section.timeout) {
            config = config.with_timeout(timeout);
        }
        if let Some(retries) = self.retries.or(section.max_retries) {
            config = config.with_max_retries(retries);
        }
        if let Some(output) = self.output.clone().or_else(|| section.output_directory.clone()) {
            config = config.with_output_directory(output);
        }
        if let Some(range) = tid_range(section.tid_min, section.tid_max)? {
            config = config.with_tid_range(range);
        }
        Ok(config)
    }
}

/// TID range from optional file bounds; a missing bound keeps its default
fn tid_range(min: Option<u16>, max: Option<u16>) -> Result<Option<RangeInclusive<u16>>> {
    if min.is_none() && max.is_none() {
        return Ok(None);
    }
    let min = min.unwrap_or(*DEFAULT_TID_RANGE.start());
    let max = max.unwrap_or(*DEFAULT_TID_RANGE.end());
    if min == 0 || min > max {
        bail!("invalid transfer id range {}..={}", min, max);
    }
    Ok(Some(min..=max))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rtftp").chain(args.iter().copied()))
    }

    #[test]
    fn role_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn server_and_client_are_exclusive() {
        assert!(parse(&["--server", "--client"]).is_err());
    }

    #[test]
    fn read_and_write_are_exclusive() {
        assert!(parse(&["--client", "--read", "a", "--write", "b"]).is_err());
    }

    #[test]
    fn client_needs_a_direction() {
        let cli = parse(&["--client"]).unwrap();
        assert!(cli.role(&FileConfig::default()).is_err());
    }

    #[test]
    fn server_rejects_client_flags() {
        let cli = parse(&["--server", "--read", "x"]).unwrap();
        assert!(cli.role(&FileConfig::default()).is_err());
    }

    #[test]
    fn client_defaults() {
        let cli = parse(&["--client", "--read", "dir/file.bin"]).unwrap();
        match cli.role(&FileConfig::default()).unwrap() {
            Role::Client(config, direction) => {
                assert_eq!(config.server_addr(), DEFAULT_REMOTE.parse().unwrap());
                assert_eq!(config.mode, TransferMode::Octet);
                assert_eq!(direction, Direction::Read("dir/file.bin".to_string()));
            }
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn flags_override_file() {
        let file = FileConfig::parse(
            "[server]\nport = 6969\ntimeout = \"9s\"\nread_only = false\ndirectory = \"/srv\"\n",
        )
        .unwrap();
        let cli = parse(&["--server", "--port", "1069", "--read-only"]).unwrap();

        match cli.role(&file).unwrap() {
            Role::Server(config) => {
                assert_eq!(config.port, 1069);
                assert!(config.read_only);
                assert_eq!(config.transfer.timeout, Duration::from_secs(9));
                assert_eq!(config.send_directory, PathBuf::from("/srv"));
                assert_eq!(config.receive_directory, PathBuf::from("/srv"));
            }
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn half_tid_range_keeps_the_default_bound() {
        let file = FileConfig::parse("[server]\ntid_min = 30000\n[client]\ntid_max = 9000\n").unwrap();

        match parse(&["--server"]).unwrap().role(&file).unwrap() {
            Role::Server(config) => assert_eq!(config.tid_range, 30000..=65535),
            other => panic!("unexpected role {:?}", other),
        }
        match parse(&["--client", "--read", "f"]).unwrap().role(&file).unwrap() {
            Role::Client(config, _) => assert_eq!(config.tid_range, 4096..=9000),
            other => panic!("unexpected role {:?}", other),
        }
    }

    #[test]
    fn inverted_tid_range_is_rejected() {
        let file = FileConfig::parse("[client]\ntid_min = 5000\ntid_max = 4999\n").unwrap();
        let cli = parse(&["--client", "--read", "f"]).unwrap();
        assert!(cli.role(&file).is_err());

        let file = FileConfig::parse("[server]\ntid_max = 1000\n").unwrap();
        assert!(parse(&["--server"]).unwrap().role(&file).is_err());
    }

    #[test]
    fn timeout_accepts_human_durations() {
        let cli = parse(&["--client", "--write", "f", "--timeout", "250ms", "--mode", "NETASCII"])
            .unwrap();
        assert_eq!(cli.timeout, Some(Duration::from_millis(250)));
        assert_eq!(cli.mode, Some(TransferMode::Netascii));
    }
}
