//! Optional TOML configuration file.
//!
//! ```toml
//! [server]
//! ip = "0.0.0.0"
//! port = 69
//! directory = "/srv/tftp"
//! receive_directory = "/srv/tftp/incoming"
//! read_only = false
//! overwrite = true
//! timeout = "5s"
//! max_retries = 5
//! tid_min = 4096
//! tid_max = 65535
//!
//! [client]
//! remote = "192.168.1.10:69"
//! timeout = "2s"
//! mode = "octet"
//! output_directory = "downloads"
//! tid_min = 20000
//! tid_max = 20999
//!
//! [log]
//! level = "debug"
//! ```
//!
//! Every key is optional; command-line flags override what is set here.
//! A TID range given by only one bound keeps the default for the other.

use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub client: ClientSection,
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub directory: Option<PathBuf>,
    pub receive_directory: Option<PathBuf>,
    pub read_only: Option<bool>,
    pub overwrite: Option<bool>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub tid_min: Option<u16>,
    pub tid_max: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub remote: Option<SocketAddr>,
    pub bind_ip: Option<IpAddr>,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub mode: Option<String>,
    pub output_directory: Option<PathBuf>,
    pub tid_min: Option<u16>,
    pub tid_max: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub level: Option<String>,
}

impl FileConfig {
    /// Load and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}
